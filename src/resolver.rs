use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::CourierConfig;
use crate::error::CourierError;
use crate::layout::{DeviceLayout, Location};
use crate::module::{ModuleInfo, ModuleListing, ModuleLocations, Resolution};
use crate::store::FileStore;
use crate::transport::{Fetched, Transport};
use crate::version;

/// Answers "which copy of this module should the device use". Markers are
/// probed over the device's own urls with a short timeout; a slow or missing
/// marker reads as "nothing there", while any other transport failure is
/// surfaced to the caller.
#[derive(Clone)]
pub struct Resolver {
    transport: Arc<dyn Transport>,
    store: Arc<dyn FileStore>,
    layout: Arc<DeviceLayout>,
    marker_timeout: Duration,
    accept_plain_marker: bool,
}

impl Resolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn FileStore>,
        layout: Arc<DeviceLayout>,
        config: &CourierConfig,
    ) -> Self {
        Self {
            transport,
            store,
            layout,
            marker_timeout: config.marker_timeout(),
            accept_plain_marker: config.accept_plain_marker,
        }
    }

    /// Reads the version marker at one location, or `None` when the location
    /// has no marker. An empty body counts as no marker; an interrupted
    /// marker write must not wedge resolution for the module.
    pub async fn marker_at(
        &self,
        location: Location,
        module_id: &str,
    ) -> Result<Option<ModuleInfo>, CourierError> {
        let url = self.layout.marker_url(location, module_id);
        let body = self
            .probe(&url)
            .await?
            .filter(|body| !body.trim().is_empty());
        if let Some(body) = body {
            return parse_marker(&url, &body).map(Some);
        }
        if !self.accept_plain_marker {
            return Ok(None);
        }
        let url = self.layout.plain_marker_url(location, module_id);
        match self.probe(&url).await? {
            Some(raw) => {
                let raw = raw.trim();
                Ok((!raw.is_empty()).then(|| ModuleInfo::new(raw)))
            }
            None => Ok(None),
        }
    }

    async fn probe(&self, url: &str) -> Result<Option<String>, CourierError> {
        match self.transport.fetch_text(url, self.marker_timeout).await? {
            Fetched::Text(text) => Ok(Some(text)),
            Fetched::Missing => Ok(None),
            Fetched::TimedOut => {
                debug!(url, "marker probe timed out");
                Ok(None)
            }
        }
    }

    /// Markers for both locations, probed concurrently.
    pub async fn module_info(&self, module_id: &str) -> Result<ModuleLocations, CourierError> {
        let (bundled, installed) = tokio::join!(
            self.marker_at(Location::Bundled, module_id),
            self.marker_at(Location::Installed, module_id),
        );
        Ok(ModuleLocations {
            installed: installed?,
            bundled: bundled?,
        })
    }

    pub async fn bundled_or_installed(&self, module_id: &str) -> Result<Resolution, CourierError> {
        let locations = self.module_info(module_id).await?;
        let resolution = resolve(&locations);
        debug!(
            module = module_id,
            location = resolution.location.as_str(),
            version = %resolution.version,
            "resolved module"
        );
        Ok(resolution)
    }

    /// Entry-page url for the winning copy of the module.
    pub async fn navigation_url(&self, module_id: &str) -> Result<String, CourierError> {
        let resolution = self.bundled_or_installed(module_id).await?;
        Ok(self.layout.navigation_url(resolution.location, module_id))
    }

    /// Every module present in either tree, with the url and raw marker
    /// version of its winning copy. Hidden directory entries are skipped.
    pub async fn list_all_modules(
        &self,
    ) -> Result<BTreeMap<String, ModuleListing>, CourierError> {
        let mut ids = BTreeSet::new();
        for location in [Location::Bundled, Location::Installed] {
            let dir = &self.layout.roots(location).dir;
            for name in self.store.list_dir(dir).await? {
                if name.starts_with('.') {
                    continue;
                }
                ids.insert(name);
            }
        }

        let mut tasks = JoinSet::new();
        for id in ids {
            let resolver = self.clone();
            tasks.spawn(async move {
                let locations = resolver.module_info(&id).await?;
                let resolution = resolve(&locations);
                let raw_version = match resolution.location {
                    Location::Installed => locations.installed.map(|m| m.version),
                    Location::Bundled => locations.bundled.map(|m| m.version),
                };
                let listing = ModuleListing {
                    version: raw_version.unwrap_or_else(|| "0.0.0".to_string()),
                    url: resolver.layout.module_url(resolution.location, &id),
                };
                Ok::<_, CourierError>((id, listing))
            });
        }

        let mut modules = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (id, listing) = joined??;
            modules.insert(id, listing);
        }
        Ok(modules)
    }
}

/// The installed copy wins only when its version is strictly greater than the
/// bundled one, so a factory reset of the bundled tree takes effect on the
/// next resolve. Markers that are absent, incomplete, or unsalvageable all
/// normalize to `0.0.0` before the comparison.
pub(crate) fn resolve(locations: &ModuleLocations) -> Resolution {
    let zero = Version::new(0, 0, 0);
    let bundled = usable(locations.bundled.as_ref()).unwrap_or_else(|| zero.clone());
    let installed = usable(locations.installed.as_ref()).unwrap_or(zero);
    if installed > bundled {
        Resolution {
            location: Location::Installed,
            version: installed,
        }
    } else {
        Resolution {
            location: Location::Bundled,
            version: bundled,
        }
    }
}

fn usable(info: Option<&ModuleInfo>) -> Option<Version> {
    let info = info?;
    if info.complete == Some(false) {
        return None;
    }
    Some(version::munge(&info.version))
}

fn parse_marker(url: &str, body: &str) -> Result<ModuleInfo, CourierError> {
    serde_json::from_str(body).map_err(|e| CourierError::MarkerParse {
        url: url.to_string(),
        source: e,
    })
}

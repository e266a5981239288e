use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CourierError;

pub const VERSION_MARKER: &str = "version.json";
pub const PLAIN_MARKER: &str = "VERSION";
pub const CACHE_DIR_NAME: &str = "downloadCache";
pub const INSTALLED_DIR_NAME: &str = "installed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    Bundled,
    Installed,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Bundled => "bundled",
            Location::Installed => "installed",
        }
    }
}

/// One location's pair of address spaces: the directory the file store
/// operates on and the url the device serves the same tree under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRoots {
    pub dir: PathBuf,
    pub url: String,
}

impl LocationRoots {
    pub fn new(dir: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            dir: dir.into(),
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceLayout {
    bundled: LocationRoots,
    installed: LocationRoots,
    cache_dir: PathBuf,
}

impl DeviceLayout {
    pub fn new(
        bundled: LocationRoots,
        installed: LocationRoots,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bundled,
            installed,
            cache_dir: cache_dir.into(),
        }
    }

    /// Standard on-device layout: the installed tree and download cache live
    /// under the per-app data and cache directories, the bundled tree is
    /// wherever the application package put it.
    pub fn for_device(
        app: &str,
        bundled: LocationRoots,
        installed_url: impl Into<String>,
    ) -> Result<Self, CourierError> {
        let dirs = ProjectDirs::from("", "", app).ok_or(CourierError::NoHomeDirectory)?;
        let installed = LocationRoots::new(dirs.data_dir().join(INSTALLED_DIR_NAME), installed_url);
        let cache_dir = dirs.cache_dir().join(CACHE_DIR_NAME);
        Ok(Self::new(bundled, installed, cache_dir))
    }

    pub fn roots(&self, location: Location) -> &LocationRoots {
        match location {
            Location::Bundled => &self.bundled,
            Location::Installed => &self.installed,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Content-addressed cache entry for one file.
    pub fn cache_entry(&self, sha: &str) -> PathBuf {
        self.cache_dir.join(sha)
    }

    pub fn module_dir(&self, location: Location, module_id: &str) -> PathBuf {
        self.roots(location).dir.join(module_id)
    }

    pub fn module_url(&self, location: Location, module_id: &str) -> String {
        format!("{}/{}", self.roots(location).url, module_id)
    }

    pub fn marker_url(&self, location: Location, module_id: &str) -> String {
        format!("{}/{}", self.module_url(location, module_id), VERSION_MARKER)
    }

    pub fn plain_marker_url(&self, location: Location, module_id: &str) -> String {
        format!("{}/{}", self.module_url(location, module_id), PLAIN_MARKER)
    }

    pub fn installed_marker_path(&self, module_id: &str) -> PathBuf {
        self.module_dir(Location::Installed, module_id)
            .join(VERSION_MARKER)
    }

    /// Destination directory for one file inside the installed module tree.
    pub fn file_dest_dir(&self, module_id: &str, local_path: &str) -> PathBuf {
        let module_dir = self.module_dir(Location::Installed, module_id);
        if local_path.is_empty() {
            module_dir
        } else {
            module_dir.join(local_path)
        }
    }

    pub fn navigation_url(&self, location: Location, module_id: &str) -> String {
        format!("{}/index.html", self.module_url(location, module_id))
    }

    /// Maps a url under one of the served roots back to its on-disk path.
    pub fn resolve_local_path(&self, url: &str) -> Option<PathBuf> {
        for location in [Location::Installed, Location::Bundled] {
            let roots = self.roots(location);
            if let Some(rest) = url.strip_prefix(&roots.url) {
                let rest = rest.trim_start_matches('/');
                return Some(roots.dir.join(rest));
            }
        }
        None
    }
}

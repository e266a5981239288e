use std::sync::Arc;

use tracing::{debug, info};

use crate::error::CourierError;
use crate::layout::{DeviceLayout, Location};
use crate::module::{Module, ModuleInfo};
use crate::store::FileStore;

/// Promotes verified cache entries into the installed tree. Copies run one at
/// a time and fail fast; the version marker is written last, so a module
/// without a marker is never treated as installed.
#[derive(Clone)]
pub struct Installer {
    store: Arc<dyn FileStore>,
    layout: Arc<DeviceLayout>,
}

impl Installer {
    pub fn new(store: Arc<dyn FileStore>, layout: Arc<DeviceLayout>) -> Self {
        Self { store, layout }
    }

    pub async fn install(&self, module: &Module) -> Result<(), CourierError> {
        info!(
            module = %module.id,
            version = %module.version,
            files = module.files.len(),
            "installing module"
        );
        for file in &module.files {
            debug!(module = %module.id, file = %file.dest_rel(), "copying into place");
            let src = self.layout.cache_entry(&file.sha);
            let dest_dir = self.layout.file_dest_dir(&module.id, &file.local_path);
            self.store
                .remove_file(&dest_dir.join(&file.local_name))
                .await?;
            self.store
                .copy_into(&src, &dest_dir, &file.local_name)
                .await?;
        }
        self.write_marker(&module.id, &module.version).await
    }

    pub async fn write_marker(&self, module_id: &str, version: &str) -> Result<(), CourierError> {
        let body = serde_json::to_vec(&ModuleInfo::new(version))?;
        self.store
            .write(&self.layout.installed_marker_path(module_id), &body)
            .await
    }

    pub async fn remove(&self, module_id: &str) -> Result<bool, CourierError> {
        let dir = self.layout.module_dir(Location::Installed, module_id);
        let removed = self.store.remove_dir_all(&dir).await?;
        if removed {
            info!(module = module_id, "removed installed module");
        }
        Ok(removed)
    }
}

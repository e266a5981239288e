use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheChecker;
use crate::config::CourierConfig;
use crate::error::CourierError;
use crate::install::Installer;
use crate::layout::DeviceLayout;
use crate::module::{Module, ModuleListing, ModuleLocations, Resolution};
use crate::progress::{CourierEvents, NullEvents, Progress};
use crate::queue::{DownloadQueue, TransferRegistry};
use crate::resolver::Resolver;
use crate::store::FileStore;
use crate::transport::Transport;

/// Front door of the crate: orchestrates download, verification, install and
/// resolution for one device. Cheap to share behind an `Arc`; every mutable
/// piece lives behind its own lock.
pub struct Courier {
    config: CourierConfig,
    checker: CacheChecker,
    queue: DownloadQueue,
    installer: Installer,
    resolver: Resolver,
    registry: TransferRegistry,
    events: Arc<dyn CourierEvents>,
}

impl Courier {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn FileStore>,
        layout: Arc<DeviceLayout>,
        config: CourierConfig,
    ) -> Self {
        Self::with_events(transport, store, layout, config, Arc::new(NullEvents))
    }

    pub fn with_events(
        transport: Arc<dyn Transport>,
        store: Arc<dyn FileStore>,
        layout: Arc<DeviceLayout>,
        config: CourierConfig,
        events: Arc<dyn CourierEvents>,
    ) -> Self {
        let checker = CacheChecker::new(
            store.clone(),
            layout.clone(),
            config.verify,
            config.concurrency,
        );
        let queue = DownloadQueue::new(
            transport.clone(),
            checker.clone(),
            layout.clone(),
            config.concurrency,
        );
        let installer = Installer::new(store.clone(), layout.clone());
        let resolver = Resolver::new(transport, store, layout, &config);
        Self {
            config,
            checker,
            queue,
            installer,
            resolver,
            registry: TransferRegistry::new(),
            events,
        }
    }

    /// Brings the module fully onto the device: downloads whatever the cache
    /// is missing, verifies the whole set, then commits it to the installed
    /// tree. Incomplete or failed rounds are retried up to the configured
    /// budget; an aborted call is never retried.
    pub async fn download_and_verify(&self, module: &Module) -> Result<(), CourierError> {
        let (id, token) = self.registry.register();
        let result = self.acquire(module, &token).await;
        self.registry.finish(id);
        if let Err(e) = &result {
            warn!(module = %module.id, error = %e, "module acquisition failed");
        }
        result
    }

    async fn acquire(
        &self,
        module: &Module,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError> {
        let progress = Arc::new(Mutex::new(Progress::for_module(module)));
        let mut failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(CourierError::Aborted);
            }
            if let Err(e) = self.queue.run(module, &progress, &self.events, cancel).await {
                if e.is_aborted() {
                    return Err(CourierError::Aborted);
                }
                warn!(module = %module.id, error = %e, "download batch had failures");
            }
            let outcome = self
                .checker
                .cache_check(module, &progress, &self.events)
                .await;
            if outcome.is_complete() {
                if cancel.is_cancelled() {
                    return Err(CourierError::Aborted);
                }
                self.installer.install(module).await?;
                self.events.module_installed(&module.id, &module.version);
                info!(module = %module.id, version = %module.version, "module ready");
                return Ok(());
            }
            failures += 1;
            debug!(
                module = %module.id,
                attempt = failures,
                missing = outcome.needed.len(),
                errors = outcome.errors.len(),
                "verification incomplete"
            );
            if failures >= self.config.max_failures {
                return Err(if outcome.errors.is_empty() {
                    CourierError::MaxFailures { attempts: failures }
                } else {
                    CourierError::from_batch(outcome.errors)
                });
            }
        }
    }

    /// Aborts every in-flight acquisition and acknowledges over the event
    /// sink. Calling with nothing in flight is harmless.
    pub fn cancel_download(&self) {
        info!(active = self.registry.active_count(), "cancelling downloads");
        self.registry.cancel_all();
        self.events.download_aborted();
    }

    /// Deletes the installed copy. Removing a module that was never
    /// installed succeeds and reports `false`.
    pub async fn remove_module(&self, module_id: &str) -> Result<bool, CourierError> {
        let removed = self.installer.remove(module_id).await?;
        if removed {
            self.events.module_removed(module_id);
        }
        Ok(removed)
    }

    pub async fn module_info(&self, module_id: &str) -> Result<ModuleLocations, CourierError> {
        self.resolver.module_info(module_id).await
    }

    pub async fn bundled_or_installed(
        &self,
        module_id: &str,
    ) -> Result<Resolution, CourierError> {
        self.resolver.bundled_or_installed(module_id).await
    }

    pub async fn navigation_url(&self, module_id: &str) -> Result<String, CourierError> {
        self.resolver.navigation_url(module_id).await
    }

    pub async fn list_all_modules(
        &self,
    ) -> Result<BTreeMap<String, ModuleListing>, CourierError> {
        self.resolver.list_all_modules().await
    }

    pub fn active_downloads(&self) -> usize {
        self.registry.active_count()
    }
}

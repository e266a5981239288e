use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::VerifyMode;
use crate::error::CourierError;
use crate::layout::DeviceLayout;
use crate::module::{Module, ModuleFile};
use crate::progress::{CourierEvents, Progress};
use crate::store::FileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Verified,
    Missing,
    Corrupt,
}

/// What one verification pass found. Hard filesystem errors are collected
/// rather than thrown, so a pass always covers the whole file set.
#[derive(Debug, Default)]
pub struct CacheOutcome {
    pub needed: Vec<ModuleFile>,
    pub errors: Vec<CourierError>,
}

impl CacheOutcome {
    pub fn is_complete(&self) -> bool {
        self.needed.is_empty() && self.errors.is_empty()
    }
}

/// Verifies cache entries against the module manifest. Corrupt entries are
/// evicted on sight so the next pass refetches them.
#[derive(Clone)]
pub struct CacheChecker {
    store: Arc<dyn FileStore>,
    layout: Arc<DeviceLayout>,
    verify: VerifyMode,
    concurrency: usize,
}

impl CacheChecker {
    pub fn new(
        store: Arc<dyn FileStore>,
        layout: Arc<DeviceLayout>,
        verify: VerifyMode,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            layout,
            verify,
            concurrency: concurrency.max(1),
        }
    }

    /// Not-found is a plain miss; a size or digest mismatch marks the entry
    /// corrupt. Only unexpected filesystem failures surface as errors.
    pub async fn check_file(&self, file: &ModuleFile) -> Result<CacheStatus, CourierError> {
        let entry = self.layout.cache_entry(&file.sha);
        let size = match self.store.stat_size(&entry).await? {
            Some(size) => size,
            None => return Ok(CacheStatus::Missing),
        };
        if size != file.size {
            return Ok(CacheStatus::Corrupt);
        }
        if self.verify == VerifyMode::Digest {
            let digest = self.store.sha256(&entry).await?;
            if digest != file.sha {
                return Ok(CacheStatus::Corrupt);
            }
        }
        Ok(CacheStatus::Verified)
    }

    /// Checks every file of the module under the bounded pool. Verified files
    /// are credited to `progress`; corrupt entries are deleted and their
    /// credit revoked. The outcome is the same for any file order.
    pub async fn cache_check(
        &self,
        module: &Module,
        progress: &Arc<Mutex<Progress>>,
        events: &Arc<dyn CourierEvents>,
    ) -> CacheOutcome {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for file in module.files.iter().cloned() {
            let checker = self.clone();
            let module_id = module.id.clone();
            let progress = progress.clone();
            let events = events.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            None,
                            Some(CourierError::Internal("verify semaphore closed".into())),
                        )
                    }
                };
                let key = file.dest_rel();
                match checker.check_file(&file).await {
                    Ok(CacheStatus::Verified) => {
                        let snapshot = progress.lock().record(&key, file.size);
                        events.file_verified(&module_id, &file.local_name);
                        events.download_progress(&module_id, snapshot);
                        (None, None)
                    }
                    Ok(CacheStatus::Missing) => {
                        debug!(module = %module_id, file = %key, "cache miss");
                        let snapshot = progress.lock().revoke(&key);
                        events.download_progress(&module_id, snapshot);
                        (Some(file), None)
                    }
                    Ok(CacheStatus::Corrupt) => {
                        warn!(module = %module_id, file = %key, sha = %file.sha, "evicting corrupt cache entry");
                        let evicted = checker
                            .store
                            .remove_file(&checker.layout.cache_entry(&file.sha))
                            .await;
                        let snapshot = progress.lock().revoke(&key);
                        events.download_progress(&module_id, snapshot);
                        (Some(file), evicted.err())
                    }
                    Err(e) => (None, Some(e)),
                }
            });
        }

        let mut outcome = CacheOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((needed, error)) => {
                    outcome.needed.extend(needed);
                    outcome.errors.extend(error);
                }
                Err(e) => outcome.errors.push(e.into()),
            }
        }
        outcome
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheChecker, CacheStatus};
use crate::error::CourierError;
use crate::layout::DeviceLayout;
use crate::module::{Module, ModuleFile};
use crate::progress::{CourierEvents, Progress};
use crate::transport::Transport;

/// Live operations by handle. Each `download_and_verify` call registers a
/// fresh token, so cancelling the bus never bleeds into a later operation.
#[derive(Default)]
pub struct TransferRegistry {
    active: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (Uuid, CancellationToken) {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        self.active.lock().insert(id, token.clone());
        (id, token)
    }

    pub fn cancel(&self, id: Uuid) -> bool {
        match self.active.lock().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut active = self.active.lock();
        for (_, token) in active.drain() {
            token.cancel();
        }
    }

    pub fn finish(&self, id: Uuid) {
        self.active.lock().remove(&id);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

/// Fetches a module's files into the cache, a bounded number at a time.
#[derive(Clone)]
pub struct DownloadQueue {
    transport: Arc<dyn Transport>,
    checker: CacheChecker,
    layout: Arc<DeviceLayout>,
    concurrency: usize,
}

impl DownloadQueue {
    pub fn new(
        transport: Arc<dyn Transport>,
        checker: CacheChecker,
        layout: Arc<DeviceLayout>,
        concurrency: usize,
    ) -> Self {
        Self {
            transport,
            checker,
            layout,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs one best-effort batch over the full file set. Files the cache
    /// already satisfies are skipped and credited; every distinct sha is
    /// fetched at most once, so no two tasks ever write the same cache path.
    /// Failures are collected and returned together after the batch drains;
    /// cancellation stops the batch and wins over collected failures.
    pub async fn run(
        &self,
        module: &Module,
        progress: &Arc<Mutex<Progress>>,
        events: &Arc<dyn CourierEvents>,
        cancel: &CancellationToken,
    ) -> Result<(), CourierError> {
        let mut groups: HashMap<&str, Vec<&ModuleFile>> = HashMap::new();
        for file in &module.files {
            groups.entry(file.sha.as_str()).or_default().push(file);
        }
        debug!(
            module = %module.id,
            files = module.files.len(),
            transfers = groups.len(),
            "starting download batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (_, group) in groups {
            let group: Vec<ModuleFile> = group.into_iter().cloned().collect();
            let url = group[0].url.clone();
            let entry = self.layout.cache_entry(&group[0].sha);
            let module_id = module.id.clone();
            let transport = self.transport.clone();
            let checker = self.checker.clone();
            let progress = progress.clone();
            let events = events.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CourierError::Aborted),
                    permit = semaphore.acquire_owned() => permit
                        .map_err(|_| CourierError::Internal("download semaphore closed".into()))?,
                };
                let credit = || {
                    let mut progress = progress.lock();
                    for file in &group {
                        let snapshot = progress.record(&file.dest_rel(), file.size);
                        events.download_progress(&module_id, snapshot);
                    }
                };
                // A valid entry needs no transfer; anything else, stale
                // content included, is overwritten by the download.
                if let Ok(CacheStatus::Verified) = checker.check_file(&group[0]).await {
                    credit();
                    return Ok(());
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CourierError::Aborted),
                    fetched = transport.download_to_path(&url, &entry) => fetched?,
                };
                credit();
                Ok(())
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(()) => {}
                Err(e) if e.is_aborted() => {
                    tasks.abort_all();
                    return Err(CourierError::Aborted);
                }
                Err(e) => {
                    warn!(module = %module.id, error = %e, "transfer failed");
                    errors.push(e);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CourierError::from_batch(errors))
        }
    }
}

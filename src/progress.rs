use std::collections::HashMap;

use serde::Serialize;

use crate::module::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub loaded_bytes: u64,
    pub total_bytes: u64,
    pub files_done: usize,
    pub files_total: usize,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.loaded_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Byte progress for one module operation, keyed by destination path. A file
/// is credited exactly once, when its cache entry verifies, and revoked only
/// if it was credited before, so the running total never dips below zero or
/// double counts a refetch.
#[derive(Debug)]
pub struct Progress {
    total_bytes: u64,
    files_total: usize,
    loaded_bytes: u64,
    counted: HashMap<String, u64>,
}

impl Progress {
    pub fn new(total_bytes: u64, files_total: usize) -> Self {
        Self {
            total_bytes,
            files_total,
            loaded_bytes: 0,
            counted: HashMap::new(),
        }
    }

    pub fn for_module(module: &Module) -> Self {
        Self::new(module.total_size(), module.files.len())
    }

    pub fn record(&mut self, key: &str, size: u64) -> ProgressSnapshot {
        if !self.counted.contains_key(key) {
            self.counted.insert(key.to_string(), size);
            self.loaded_bytes += size;
        }
        self.snapshot()
    }

    pub fn revoke(&mut self, key: &str) -> ProgressSnapshot {
        if let Some(size) = self.counted.remove(key) {
            self.loaded_bytes -= size;
        }
        self.snapshot()
    }

    pub fn is_complete(&self) -> bool {
        self.counted.len() == self.files_total
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            loaded_bytes: self.loaded_bytes,
            total_bytes: self.total_bytes,
            files_done: self.counted.len(),
            files_total: self.files_total,
        }
    }
}

/// Observer for operation milestones. Implementations forward to whatever
/// event bus the host application uses; every method defaults to a no-op.
pub trait CourierEvents: Send + Sync {
    fn download_progress(&self, module_id: &str, snapshot: ProgressSnapshot) {
        let _ = (module_id, snapshot);
    }

    fn file_verified(&self, module_id: &str, local_name: &str) {
        let _ = (module_id, local_name);
    }

    fn module_installed(&self, module_id: &str, version: &str) {
        let _ = (module_id, version);
    }

    fn module_removed(&self, module_id: &str) {
        let _ = module_id;
    }

    /// Acknowledgment that the cancellation bus fired.
    fn download_aborted(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl CourierEvents for NullEvents {}

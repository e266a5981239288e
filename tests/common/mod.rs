#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use module_courier::{
    CourierError, CourierEvents, DeviceLayout, DiskStore, Fetched, FileStore, LocationRoots,
    Module, ModuleFile, ProgressSnapshot, Transport,
};

#[derive(Clone)]
pub enum Reply {
    Bytes(Vec<u8>),
    Fail,
    Hang,
}

/// Transport whose answers are scripted per url, with per-url hit counting.
/// Unscripted downloads fail; unscripted marker probes read as missing.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    markers: Mutex<HashMap<String, Fetched>>,
    hits: Mutex<HashMap<String, usize>>,
    pub started: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.replies
            .lock()
            .insert(url.to_string(), Reply::Bytes(body.to_vec()));
    }

    pub fn fail(&self, url: &str) {
        self.replies.lock().insert(url.to_string(), Reply::Fail);
    }

    /// The next request for `url` signals `started`, then never completes.
    pub fn hang(&self, url: &str) {
        self.replies.lock().insert(url.to_string(), Reply::Hang);
    }

    pub fn marker(&self, url: &str, fetched: Fetched) {
        self.markers.lock().insert(url.to_string(), fetched);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().values().sum()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn download_to_path(&self, url: &str, dest: &Path) -> Result<(), CourierError> {
        *self.hits.lock().entry(url.to_string()).or_insert(0) += 1;
        let reply = self.replies.lock().get(url).cloned();
        match reply {
            Some(Reply::Bytes(body)) => DiskStore::new().write(dest, &body).await,
            Some(Reply::Hang) => {
                self.started.notify_one();
                std::future::pending().await
            }
            Some(Reply::Fail) | None => {
                Err(CourierError::Internal(format!("scripted failure for {url}")))
            }
        }
    }

    async fn fetch_text(&self, url: &str, _timeout: Duration) -> Result<Fetched, CourierError> {
        Ok(self
            .markers
            .lock()
            .get(url)
            .cloned()
            .unwrap_or(Fetched::Missing))
    }
}

/// Event sink that keeps everything it sees.
#[derive(Default)]
pub struct RecordingEvents {
    pub snapshots: Mutex<Vec<(String, ProgressSnapshot)>>,
    pub verified: Mutex<Vec<(String, String)>>,
    pub installed: Mutex<Vec<(String, String)>>,
    pub removed: Mutex<Vec<String>>,
    pub aborts: Mutex<usize>,
}

impl CourierEvents for RecordingEvents {
    fn download_progress(&self, module_id: &str, snapshot: ProgressSnapshot) {
        self.snapshots
            .lock()
            .push((module_id.to_string(), snapshot));
    }

    fn file_verified(&self, module_id: &str, local_name: &str) {
        self.verified
            .lock()
            .push((module_id.to_string(), local_name.to_string()));
    }

    fn module_installed(&self, module_id: &str, version: &str) {
        self.installed
            .lock()
            .push((module_id.to_string(), version.to_string()));
    }

    fn module_removed(&self, module_id: &str) {
        self.removed.lock().push(module_id.to_string());
    }

    fn download_aborted(&self) {
        *self.aborts.lock() += 1;
    }
}

pub struct TestDevice {
    pub dir: tempfile::TempDir,
    pub layout: Arc<DeviceLayout>,
    pub store: Arc<DiskStore>,
}

impl TestDevice {
    pub fn new() -> Self {
        Self::with_urls("http://device.local/bundled", "http://device.local/installed")
    }

    pub fn with_urls(bundled_url: &str, installed_url: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = Arc::new(DeviceLayout::new(
            LocationRoots::new(dir.path().join("bundled"), bundled_url),
            LocationRoots::new(dir.path().join("installed"), installed_url),
            dir.path().join("cache"),
        ));
        Self {
            dir,
            layout,
            store: Arc::new(DiskStore::new()),
        }
    }

    pub async fn seed_cache(&self, sha: &str, body: &[u8]) {
        self.store
            .write(&self.layout.cache_entry(sha), body)
            .await
            .unwrap();
    }
}

pub fn file(url: &str, sha: &str, size: u64, name: &str) -> ModuleFile {
    ModuleFile {
        url: url.into(),
        sha: sha.into(),
        size,
        local_path: String::new(),
        local_name: name.into(),
    }
}

pub fn file_at(url: &str, sha: &str, size: u64, path: &str, name: &str) -> ModuleFile {
    ModuleFile {
        url: url.into(),
        sha: sha.into(),
        size,
        local_path: path.into(),
        local_name: name.into(),
    }
}

pub fn module(id: &str, version: &str, files: Vec<ModuleFile>) -> Module {
    Module {
        id: id.into(),
        version: version.into(),
        files,
    }
}

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::CourierError;

/// Narrow view of the device filesystem so pipelines can run against a fake
/// store in tests.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Size in bytes, or `None` when the file does not exist.
    async fn stat_size(&self, path: &Path) -> Result<Option<u64>, CourierError>;

    /// Writes the full contents, creating parent directories as needed.
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), CourierError>;

    /// Copies `src` into `dest_dir/file_name`, creating `dest_dir` first.
    async fn copy_into(
        &self,
        src: &Path,
        dest_dir: &Path,
        file_name: &str,
    ) -> Result<(), CourierError>;

    /// Returns whether anything was removed.
    async fn remove_file(&self, path: &Path) -> Result<bool, CourierError>;

    async fn remove_dir_all(&self, path: &Path) -> Result<bool, CourierError>;

    /// Entry names directly under `path`. A missing directory reads as empty.
    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, CourierError>;

    async fn sha256(&self, path: &Path) -> Result<String, CourierError>;
}

#[derive(Debug, Default, Clone)]
pub struct DiskStore;

impl DiskStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStore for DiskStore {
    async fn stat_size(&self, path: &Path) -> Result<Option<u64>, CourierError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CourierError::io("stat", path, e)),
        }
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), CourierError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CourierError::io("create dir", parent, e))?;
        }
        fs::write(path, bytes)
            .await
            .map_err(|e| CourierError::io("write", path, e))
    }

    async fn copy_into(
        &self,
        src: &Path,
        dest_dir: &Path,
        file_name: &str,
    ) -> Result<(), CourierError> {
        fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| CourierError::io("create dir", dest_dir, e))?;
        let dest = dest_dir.join(file_name);
        fs::copy(src, &dest)
            .await
            .map_err(|e| CourierError::io("copy", src, e))?;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> Result<bool, CourierError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CourierError::io("remove", path, e)),
        }
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<bool, CourierError> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CourierError::io("remove dir", path, e)),
        }
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<String>, CourierError> {
        let mut reader = match fs::read_dir(path).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CourierError::io("read dir", path, e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| CourierError::io("read dir", path, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn sha256(&self, path: &Path) -> Result<String, CourierError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || compute_sha256(&path)).await?
    }
}

fn compute_sha256(path: &Path) -> Result<String, CourierError> {
    let file = std::fs::File::open(path).map_err(|e| CourierError::io("open", path, e))?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| CourierError::io("read", path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::CourierError;

/// Outcome of a marker probe. Slow and missing markers are ordinary states
/// for a device that has never installed anything, not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Text(String),
    Missing,
    TimedOut,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Streams one file to `dest`, creating parent directories as needed.
    /// Dropping the future abandons the request.
    async fn download_to_path(&self, url: &str, dest: &Path) -> Result<(), CourierError>;

    /// Small-document probe bounded by `timeout`.
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<Fetched, CourierError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(CourierError::ClientInit)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download_to_path(&self, url: &str, dest: &Path) -> Result<(), CourierError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CourierError::http(url, e))?
            .error_for_status()
            .map_err(|e| CourierError::http(url, e))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CourierError::io("create dir", parent, e))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| CourierError::io("create", dest, e))?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CourierError::http(url, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| CourierError::io("write", dest, e))?;
        }
        file.flush()
            .await
            .map_err(|e| CourierError::io("flush", dest, e))
    }

    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<Fetched, CourierError> {
        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| CourierError::http(url, e))?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(Fetched::Missing);
            }
            let response = response
                .error_for_status()
                .map_err(|e| CourierError::http(url, e))?;
            let text = response
                .text()
                .await
                .map_err(|e| CourierError::http(url, e))?;
            Ok(Fetched::Text(text))
        };
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Ok(Fetched::TimedOut),
        }
    }
}

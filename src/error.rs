use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("download aborted")]
    Aborted,

    #[error("max failures reached after {attempts} attempts")]
    MaxFailures { attempts: u32 },

    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("http client init failed: {0}")]
    ClientInit(reqwest::Error),

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid version marker at {url}: {source}")]
    MarkerParse {
        url: String,
        source: serde_json::Error,
    },

    #[error("version marker serialization failed: {0}")]
    MarkerEncode(#[from] serde_json::Error),

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{} errors during module transfer", .0.len())]
    Multiple(Vec<CourierError>),

    #[error("no usable home directory for device paths")]
    NoHomeDirectory,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    pub(crate) fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    // Collapses a batch error list: a single entry surfaces as itself.
    pub(crate) fn from_batch(mut errors: Vec<CourierError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

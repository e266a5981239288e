use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of transfers or stat calls in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Download/verify passes attempted before giving up on a module.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Budget for a single version-marker fetch, in milliseconds.
pub const DEFAULT_MARKER_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VerifyMode {
    /// Cache entries are valid when their stored size equals the declared size.
    Size,
    /// Size equality plus a sha256 comparison against the file's content id.
    Digest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CourierConfig {
    pub concurrency: usize,
    pub max_failures: u32,
    pub marker_timeout_ms: u64,
    pub verify: VerifyMode,
    /// Accept a plain-text `VERSION` file when `version.json` is absent.
    pub accept_plain_marker: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_failures: DEFAULT_MAX_FAILURES,
            marker_timeout_ms: DEFAULT_MARKER_TIMEOUT_MS,
            verify: VerifyMode::Size,
            accept_plain_marker: false,
        }
    }
}

impl CourierConfig {
    pub fn marker_timeout(&self) -> Duration {
        Duration::from_millis(self.marker_timeout_ms)
    }
}

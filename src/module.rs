use semver::Version;
use serde::{Deserialize, Serialize};

use crate::layout::Location;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFile {
    pub url: String,
    /// Content identifier; doubles as the cache key and cache filename.
    pub sha: String,
    /// Expected size in bytes, as listed by the origin manifest.
    pub size: u64,
    /// Directory of the file relative to the module root; empty for the root.
    #[serde(default)]
    pub local_path: String,
    pub local_name: String,
}

impl ModuleFile {
    /// Destination relative to the module root. Distinct per file even when
    /// two files share a sha, which makes it the progress key.
    pub fn dest_rel(&self) -> String {
        if self.local_path.is_empty() {
            self.local_name.clone()
        } else {
            format!("{}/{}", self.local_path, self.local_name)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(alias = "_id")]
    pub id: String,
    pub version: String,
    pub files: Vec<ModuleFile>,
}

impl Module {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

/// Payload of a version marker (`version.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
}

impl ModuleInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            complete: None,
        }
    }
}

/// Markers found (or not) for one module at both on-device locations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleLocations {
    pub installed: Option<ModuleInfo>,
    pub bundled: Option<ModuleInfo>,
}

/// Outcome of a bundled-vs-installed comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub location: Location,
    pub version: Version,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleListing {
    pub version: String,
    pub url: String,
}

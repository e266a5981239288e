//! Downloads, verifies, and installs versioned content modules on a device,
//! and resolves whether the bundled or the installed copy of each module
//! should be served.

pub mod cache;
pub mod config;
pub mod courier;
pub mod error;
pub mod install;
pub mod layout;
pub mod logging;
pub mod module;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod service;
pub mod store;
pub mod transport;
pub mod version;

pub use cache::{CacheChecker, CacheOutcome, CacheStatus};
pub use config::{CourierConfig, VerifyMode};
pub use courier::Courier;
pub use error::CourierError;
pub use install::Installer;
pub use layout::{DeviceLayout, Location, LocationRoots};
pub use module::{Module, ModuleFile, ModuleInfo, ModuleListing, ModuleLocations, Resolution};
pub use progress::{CourierEvents, NullEvents, Progress, ProgressSnapshot};
pub use queue::{DownloadQueue, TransferRegistry};
pub use resolver::Resolver;
pub use service::{UpdateJob, UpdateService};
pub use store::{DiskStore, FileStore};
pub use transport::{Fetched, HttpTransport, Transport};

//! Enrichment Store - persistent event enrichment and hosted resource caching
//!
//! Holds the key/value context merged into every outgoing tracking event, and
//! fetches, revalidates and caches the remote JSON resources that feed it.

pub mod clock;
pub mod config;
pub mod datalayer;
pub mod error;
pub mod hosted;
pub mod logging;
pub mod network;
pub mod storage;
pub mod tasks;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use datalayer::{DataLayer, DataLayerEvent, Expiry, TimeUnit};
pub use hosted::{DispatchValidator, HostedDataLayer, ModuleDelegate, TrackRequest};
pub use network::{ResourceRefresher, ResourceRetriever};
pub use tasks::spawn_cleanup_task;

//! Data Layer Module
//!
//! The persistent key/value enrichment store merged into every outgoing event,
//! with per-key expiry, a restart-scoped mirror and session lifecycle.

mod events;
mod expiry;
mod item;
mod session;
mod store;


// Re-export public types
pub use events::DataLayerEvent;
pub use expiry::{Expiry, ExpiryDate, TimeUnit};
pub use item::{DataLayerItem, ItemSet};
pub use session::{HttpSessionStarter, SessionStarter};
pub use store::DataLayer;

#[cfg(test)]
pub(crate) use session::tests::MockSessionStarter;

// == Data Layer Keys ==
pub const SESSION_ID_KEY: &str = "tealium_session_id";
pub const RANDOM_KEY: &str = "tealium_random";
pub const ACCOUNT_KEY: &str = "tealium_account";
pub const PROFILE_KEY: &str = "tealium_profile";
pub const ENVIRONMENT_KEY: &str = "tealium_environment";
pub const DATA_SOURCE_KEY: &str = "tealium_datasource";
pub const LIBRARY_NAME_KEY: &str = "tealium_library_name";
pub const LIBRARY_VERSION_KEY: &str = "tealium_library_version";
pub const ORIGIN_KEY: &str = "origin";

pub const TIMESTAMP_EPOCH_KEY: &str = "tealium_timestamp_epoch";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const TIMESTAMP_LOCAL_KEY: &str = "timestamp_local";
pub const TIMESTAMP_OFFSET_KEY: &str = "timestamp_offset";
pub const TIMESTAMP_UNIX_KEY: &str = "timestamp_unix";
pub const TIMESTAMP_UNIX_MILLISECONDS_KEY: &str = "timestamp_unix_milliseconds";

pub const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ORIGIN_MOBILE: &str = "mobile";

/// Storage slot namespace for persisted items.
pub const STORAGE_NAMESPACE: &str = "eventdata";

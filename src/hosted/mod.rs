//! Hosted Data Layer Module
//!
//! Request-time augmentation from externally hosted per-item JSON fragments,
//! backed by a bounded, age-pruned cache.

mod cache;
mod item;
mod layer;
mod request;
mod retriever;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use cache::HostedDataCache;
pub use item::HostedDataLayerCacheItem;
pub use layer::{
    HostedDataLayer, AWAITING_RESPONSE, ERROR_KEY, QUEUE_REASON_KEY, RESPONSE_RECEIVED,
    STORAGE_NAMESPACE,
};
pub use request::{DispatchValidator, ModuleDelegate, TrackRequest, EVENT_KEY};
pub use retriever::{HostedDataRetriever, HttpHostedDataRetriever};
pub use stats::HostedCacheStats;

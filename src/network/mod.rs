//! Network Module
//!
//! HTTP client seam, the etag-aware resource retriever and the interval
//! driven refresher built on top of it.

mod client;
mod cooldown;
mod refresher;
pub(crate) mod retriever;

// Re-export public types
pub use client::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use cooldown::ErrorCooldown;
pub use refresher::{CachedResource, RefreshParameters, ResourceRefresher, ResourceRefresherDelegate};
pub use retriever::{
    EtagResource, ResourceBuilder, ResourceRetriever, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
};

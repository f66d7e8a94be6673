//! Hosted data layer cache entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One fetched fragment, keyed by the item id it was requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedDataLayerCacheItem {
    pub id: String,
    pub data: Map<String, Value>,
    pub retrieved_at: DateTime<Utc>,
}

impl HostedDataLayerCacheItem {
    pub fn new(id: impl Into<String>, data: Map<String, Value>, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            data,
            retrieved_at,
        }
    }

    /// Retrieved strictly after `since`.
    pub fn is_newer_than(&self, since: DateTime<Utc>) -> bool {
        self.retrieved_at > since
    }
}

//! Data Layer Item Module
//!
//! Defines individual enrichment entries and the keyed set that owns them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expiry::ExpiryDate;

// == Data Layer Item ==
/// A single key/value pair with its expiration metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLayerItem {
    pub key: String,
    pub value: Value,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub is_session_scoped: bool,
}

impl DataLayerItem {
    pub fn new(key: impl Into<String>, value: Value, expiry: ExpiryDate) -> Self {
        Self {
            key: key.into(),
            value,
            expires_at: expiry.expires_at,
            is_session_scoped: expiry.is_session_scoped,
        }
    }

    // == Is Expired ==
    /// Checks if the item has expired by date.
    ///
    /// Boundary condition: an item is expired once `now >= expires_at`.
    /// Session scoped items never expire by date.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_session_scoped && now >= self.expires_at
    }
}

// == Item Set ==
/// Keyed collection holding at most one item per key.
#[derive(Debug, Clone, Default)]
pub struct ItemSet {
    entries: HashMap<String, DataLayerItem>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from persisted items; later duplicates win.
    pub fn from_items(items: Vec<DataLayerItem>) -> Self {
        let entries = items
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();
        Self { entries }
    }

    // == Insert ==
    /// Inserts every pair of `data`, replacing any existing item with the same key.
    pub fn insert_from(&mut self, data: &Map<String, Value>, expiry: ExpiryDate) {
        for (key, value) in data {
            self.entries
                .insert(key.clone(), DataLayerItem::new(key.clone(), value.clone(), expiry));
        }
    }

    // == Remove ==
    /// Removes the item for `key`, returning it when present.
    pub fn remove(&mut self, key: &str) -> Option<DataLayerItem> {
        self.entries.remove(key)
    }

    // == Remove Expired ==
    /// Removes every date-expired item and returns the removed keys.
    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|item| item.is_expired(now))
            .map(|item| item.key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }

    // == Remove Session Data ==
    /// Removes every session scoped item and returns the removed keys.
    pub fn remove_session_data(&mut self) -> Vec<String> {
        let scoped: Vec<String> = self
            .entries
            .values()
            .filter(|item| item.is_session_scoped)
            .map(|item| item.key.clone())
            .collect();

        for key in &scoped {
            self.entries.remove(key);
        }
        scoped
    }

    pub fn clear(&mut self) -> Vec<String> {
        self.entries.drain().map(|(key, _)| key).collect()
    }

    pub fn get(&self, key: &str) -> Option<&DataLayerItem> {
        self.entries.get(key)
    }

    /// Returns the value for `key` unless it has expired.
    pub fn live_value(&self, key: &str, now: DateTime<Utc>) -> Option<&Value> {
        self.entries
            .get(key)
            .filter(|item| !item.is_expired(now))
            .map(|item| &item.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Key/value pairs of every item that is still live at `now`.
    pub fn live(&self, now: DateTime<Utc>) -> Map<String, Value> {
        self.entries
            .values()
            .filter(|item| !item.is_expired(now))
            .map(|item| (item.key.clone(), item.value.clone()))
            .collect()
    }

    /// Items in a stable order for persistence.
    pub fn to_items(&self) -> Vec<DataLayerItem> {
        let mut items: Vec<DataLayerItem> = self.entries.values().cloned().collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

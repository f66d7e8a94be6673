//! In-memory blob store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use super::{DiskStorage, DEFAULT_FILE_NAME};
use crate::error::Result;

/// Namespaced in-memory [`DiskStorage`].
///
/// Clones share the same backing map, so a clone with a different namespace
/// behaves like another module's directory on the same disk.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    namespace: String,
    blobs: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStorage {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns a store for another namespace over the same blobs.
    pub fn for_module(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            blobs: Arc::clone(&self.blobs),
        }
    }

    /// Number of blobs across all namespaces.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn slot(&self, file_name: Option<&str>) -> String {
        format!("{}.{}", self.namespace, file_name.unwrap_or(DEFAULT_FILE_NAME))
    }
}

impl DiskStorage for MemoryStorage {
    fn retrieve_value(&self, file_name: Option<&str>) -> Option<Value> {
        self.blobs.read().get(&self.slot(file_name)).cloned()
    }

    fn save_value(&self, file_name: Option<&str>, value: Value) -> Result<()> {
        self.blobs.write().insert(self.slot(file_name), value);
        Ok(())
    }

    fn delete(&self, file_name: Option<&str>) {
        self.blobs.write().remove(&self.slot(file_name));
    }
}

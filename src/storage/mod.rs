//! Storage Module
//!
//! Opaque key/value blob persistence used by the data layer, the resource
//! refresher and the hosted data layer. Where and how blobs land is owned by
//! the implementation; callers only see typed values.

mod memory;

pub use memory::MemoryStorage;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// Slot used when no file name is given.
pub const DEFAULT_FILE_NAME: &str = "default";

// == Disk Storage ==
/// Blob store scoped to a single module namespace.
pub trait DiskStorage: Send + Sync {
    /// Returns the raw blob stored under `file_name` (or the default slot).
    fn retrieve_value(&self, file_name: Option<&str>) -> Option<Value>;

    /// Replaces the blob stored under `file_name` (or the default slot).
    fn save_value(&self, file_name: Option<&str>, value: Value) -> Result<()>;

    /// Removes the blob stored under `file_name` (or the default slot).
    fn delete(&self, file_name: Option<&str>);
}

// == Typed Access ==
/// Typed helpers over any [`DiskStorage`].
///
/// A blob that does not decode into the requested type is reported as absent.
pub trait DiskStorageExt: DiskStorage {
    fn retrieve<T: DeserializeOwned>(&self) -> Option<T> {
        self.retrieve_file(None)
    }

    fn retrieve_file<T: DeserializeOwned>(&self, file_name: Option<&str>) -> Option<T> {
        let value = self.retrieve_value(file_name)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(
                    "Discarding unreadable blob in slot {}: {}",
                    file_name.unwrap_or(DEFAULT_FILE_NAME),
                    err
                );
                None
            }
        }
    }

    fn save<T: Serialize + ?Sized>(&self, value: &T, file_name: Option<&str>) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.save_value(file_name, value)
    }
}

impl<S: DiskStorage + ?Sized> DiskStorageExt for S {}

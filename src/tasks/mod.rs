//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the store is in use.
//!
//! # Tasks
//! - Expiry Sweep: Removes date-expired data layer items at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;

//! Expiry Sweep Task
//!
//! Background task that periodically removes date-expired data layer items.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::datalayer::DataLayer;

/// Spawns a task that calls [`DataLayer::sweep_expired`] every `interval`.
///
/// Abort the returned handle on shutdown.
///
/// # Example
/// ```ignore
/// let data_layer = Arc::new(DataLayer::new(&config, storage, starter));
/// let sweep = spawn_cleanup_task(data_layer.clone(), config.cleanup_interval);
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_cleanup_task(data_layer: Arc<DataLayer>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiry sweep task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = data_layer.sweep_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired items", removed);
            } else {
                debug!("Expiry sweep: no expired items found");
            }
        }
    })
}

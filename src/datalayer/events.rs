//! Data layer change notifications.

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::trace;

/// Buffered notifications per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 128;

/// A change to the data layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DataLayerEvent {
    /// Key/value pairs that were added or replaced
    Updated(Map<String, Value>),
    /// Keys that are no longer present
    Removed(Vec<String>),
}

/// Fan-out of [`DataLayerEvent`]s. Dropping a receiver unsubscribes it.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<DataLayerEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DataLayerEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: DataLayerEvent) {
        // Sending only fails when nobody is listening
        if let Ok(receivers) = self.sender.send(event) {
            trace!("Data layer event delivered to {} subscribers", receivers);
        }
    }

    pub(crate) fn publish_removed(&self, keys: Vec<String>) {
        if !keys.is_empty() {
            self.publish(DataLayerEvent::Removed(keys));
        }
    }
}

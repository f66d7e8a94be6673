//! Dispatch pipeline seams: the track request, the validator contract and
//! the dequeue callback.

use std::collections::HashMap;

use serde_json::{Map, Value};
use uuid::Uuid;

/// Payload key carrying the event name.
pub const EVENT_KEY: &str = "tealium_event";

// == Track Request ==
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    /// Identifies one physical request across re-evaluations
    pub uuid: String,
    pub data: Map<String, Value>,
}

impl TrackRequest {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            data,
        }
    }

    pub fn with_uuid(uuid: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            uuid: uuid.into(),
            data,
        }
    }

    pub fn event(&self) -> Option<&str> {
        self.data.get(EVENT_KEY).and_then(Value::as_str)
    }

    /// The payload key mapped to this request's event name, if any.
    pub fn extract_key<'a>(&self, lookup: &'a HashMap<String, String>) -> Option<&'a str> {
        lookup.get(self.event()?).map(String::as_str)
    }

    /// The value under `key`; arrays yield their first element.
    pub fn extract_lookup_value(&self, key: &str) -> Option<&Value> {
        match self.data.get(key)? {
            Value::Array(values) => values.first(),
            value => Some(value),
        }
    }

    /// Merges `extra` into the payload, overwriting existing keys.
    pub fn merge(&mut self, extra: Map<String, Value>) {
        self.data.extend(extra);
    }
}

// == Dispatch Validator ==
/// Consulted by the dispatch pipeline before a request is sent.
pub trait DispatchValidator: Send + Sync {
    /// Whether to defer the request, plus data to merge into it either way.
    fn should_queue(&self, request: &TrackRequest) -> (bool, Option<Map<String, Value>>);

    fn should_drop(&self, request: &TrackRequest) -> bool;

    fn should_purge(&self, request: &TrackRequest) -> bool;
}

// == Module Delegate ==
/// Callback into the dispatch pipeline.
pub trait ModuleDelegate: Send + Sync {
    /// Asks the pipeline to re-evaluate deferred requests.
    fn request_dequeue(&self, reason: &str);
}

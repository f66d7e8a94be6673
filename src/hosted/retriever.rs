//! Hosted data fragment retrieval.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::HostedDataError;
use crate::network::{HttpClient, HttpRequest};

/// Fetches one hosted JSON object.
#[async_trait]
pub trait HostedDataRetriever: Send + Sync {
    async fn get_data(&self, url: &str) -> Result<Map<String, Value>, HostedDataError>;
}

/// [`HostedDataRetriever`] over any [`HttpClient`]. No auth headers, no etag.
pub struct HttpHostedDataRetriever {
    client: Arc<dyn HttpClient>,
}

impl HttpHostedDataRetriever {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HostedDataRetriever for HttpHostedDataRetriever {
    async fn get_data(&self, url: &str) -> Result<Map<String, Value>, HostedDataError> {
        let response = self.client.send(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(HostedDataError::Non200Response(response.status));
        }
        if response.body.is_empty() {
            return Err(HostedDataError::EmptyResponse);
        }
        match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(data)) => Ok(data),
            Ok(other) => Err(HostedDataError::UnableToDecodeData(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(err) => Err(HostedDataError::UnableToDecodeData(err.to_string())),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Resource Retriever
//!
//! Fetches one decodable resource with etag-aware conditional GET and a
//! bounded linear-backoff retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::client::{HttpClient, HttpRequest};
use crate::error::RetrieverError;

/// Attempts per `get_resource` call, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay unit; attempt `n` waits `n` times this before retrying.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A resource that carries the etag it was served with.
pub trait EtagResource {
    fn etag(&self) -> Option<&str>;
}

/// Turns a response body and its etag into a resource, or rejects it.
pub type ResourceBuilder<R> = Arc<dyn Fn(&[u8], Option<&str>) -> Option<R> + Send + Sync>;

// == Resource Retriever ==
pub struct ResourceRetriever<R> {
    client: Arc<dyn HttpClient>,
    builder: ResourceBuilder<R>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<R> ResourceRetriever<R> {
    pub fn new<F>(client: Arc<dyn HttpClient>, builder: F) -> Self
    where
        F: Fn(&[u8], Option<&str>) -> Option<R> + Send + Sync + 'static,
    {
        Self {
            client,
            builder: Arc::new(builder),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    // == Get Resource ==
    /// Fetches `url`, sending `If-None-Match` when an etag is known.
    ///
    /// Retryable failures are retried after `retry_delay * attempt` until
    /// `max_attempts` is reached; the last error is returned.
    pub async fn get_resource(&self, url: &str, etag: Option<&str>) -> Result<R, RetrieverError> {
        let mut request = HttpRequest::get(url);
        if let Some(etag) = etag {
            request = request.with_header("If-None-Match", etag);
            request.ignore_local_cache = true;
        }

        let mut attempt = 1;
        loop {
            match self.send_request(&request).await {
                Ok(resource) => return Ok(resource),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.retry_delay * attempt;
                    debug!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt, url, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if !err.is_not_modified() {
                        warn!("Giving up on {} after {} attempts: {}", url, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn send_request(&self, request: &HttpRequest) -> Result<R, RetrieverError> {
        let response = self.client.send(request.clone()).await?;
        match response.status {
            200..=299 => {
                if response.body.is_empty() {
                    return Err(RetrieverError::EmptyBody);
                }
                (self.builder)(&response.body, response.etag()).ok_or_else(|| {
                    RetrieverError::CouldNotDecodeJson(format!(
                        "resource rejected {} byte body",
                        response.body.len()
                    ))
                })
            }
            304 => Err(RetrieverError::NotModified),
            code => Err(RetrieverError::Non200Response(code)),
        }
    }
}

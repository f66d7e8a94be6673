//! Resource Refresher
//!
//! Keeps one remote resource fresh: decides when a refresh is due, persists
//! what the retriever returns and tells a delegate about loads and failures.
//! The last persisted value stays readable whatever happens to later fetches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::cooldown::{add_duration, ErrorCooldown};
use super::retriever::{EtagResource, ResourceRetriever};
use crate::clock::{system_clock, Clock};
use crate::error::RetrieverError;
use crate::storage::{DiskStorage, DiskStorageExt};

// == Refresh Parameters ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshParameters {
    pub id: String,
    pub url: String,
    /// Storage slot; the default slot when absent
    pub file_name: Option<String>,
    pub refresh_interval: Duration,
    pub error_cooldown_base_interval: Option<Duration>,
}

impl RefreshParameters {
    pub fn new(id: impl Into<String>, url: impl Into<String>, refresh_interval: Duration) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            file_name: None,
            refresh_interval,
            error_cooldown_base_interval: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_error_cooldown(mut self, base_interval: Duration) -> Self {
        self.error_cooldown_base_interval = Some(base_interval);
        self
    }
}

// == Delegate ==
pub trait ResourceRefresherDelegate<R>: Send + Sync {
    fn did_load(&self, refresher_id: &str, resource: &R);

    fn did_fail_to_load(&self, _refresher_id: &str, _error: &RetrieverError) {}
}

// == Cached Resource ==
/// Refresh bookkeeping. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedResource {
    pub etag: Option<String>,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_error: Option<RetrieverError>,
    pub consecutive_errors: u32,
    pub fetching: bool,
}

struct RefresherState<R> {
    parameters: RefreshParameters,
    cooldown: Option<ErrorCooldown>,
    cached: CachedResource,
    is_file_cached: bool,
    delegate: Option<Arc<dyn ResourceRefresherDelegate<R>>>,
}

impl<R> RefresherState<R> {
    fn should_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.cached.fetching {
            return false;
        }
        let Some(last_fetch) = self.cached.last_fetch else {
            return true;
        };
        if let Some(cooldown) = &self.cooldown {
            if !self.is_file_cached {
                return !cooldown.is_in_cooldown(last_fetch, self.cached.consecutive_errors, now);
            }
        }
        now >= add_duration(last_fetch, self.parameters.refresh_interval)
    }
}

/// Clears the fetching flag even when the refresh future is dropped mid-flight.
struct FetchGuard<'a, R> {
    state: &'a Mutex<RefresherState<R>>,
}

impl<R> Drop for FetchGuard<'_, R> {
    fn drop(&mut self) {
        self.state.lock().cached.fetching = false;
    }
}

// == Resource Refresher ==
pub struct ResourceRefresher<R> {
    retriever: ResourceRetriever<R>,
    storage: Arc<dyn DiskStorage>,
    clock: Arc<dyn Clock>,
    state: Mutex<RefresherState<R>>,
}

impl<R> ResourceRefresher<R>
where
    R: Serialize + DeserializeOwned + EtagResource,
{
    pub fn new(
        retriever: ResourceRetriever<R>,
        storage: Arc<dyn DiskStorage>,
        parameters: RefreshParameters,
    ) -> Self {
        Self::with_clock(retriever, storage, parameters, system_clock())
    }

    /// Reads the persisted resource once so its etag backs the first request.
    pub fn with_clock(
        retriever: ResourceRetriever<R>,
        storage: Arc<dyn DiskStorage>,
        parameters: RefreshParameters,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cooldown = ErrorCooldown::new(
            parameters.error_cooldown_base_interval,
            parameters.refresh_interval,
        );
        let persisted: Option<R> = storage.retrieve_file(parameters.file_name.as_deref());
        let cached = CachedResource {
            etag: persisted
                .as_ref()
                .and_then(|resource| resource.etag().map(str::to_string)),
            ..CachedResource::default()
        };

        Self {
            retriever,
            storage,
            clock,
            state: Mutex::new(RefresherState {
                parameters,
                cooldown,
                cached,
                is_file_cached: persisted.is_some(),
                delegate: None,
            }),
        }
    }

    pub fn id(&self) -> String {
        self.state.lock().parameters.id.clone()
    }

    pub fn should_refresh(&self) -> bool {
        self.state.lock().should_refresh(self.clock.now())
    }

    // == Request Refresh ==
    /// Fetches the resource when a refresh is due. Returns whether a fetch ran.
    pub async fn request_refresh(&self) -> bool {
        let (id, url, etag) = {
            let mut state = self.state.lock();
            if !state.should_refresh(self.clock.now()) {
                return false;
            }
            state.cached.fetching = true;
            (
                state.parameters.id.clone(),
                state.parameters.url.clone(),
                state.cached.etag.clone(),
            )
        };
        let _guard = FetchGuard { state: &self.state };

        debug!("Refreshing resource {} from {}", id, url);
        let result = self.retriever.get_resource(&url, etag.as_deref()).await;

        match result {
            Ok(resource) => {
                self.save_resource(&resource);
                self.on_resource_loaded(&resource);
                let mut state = self.state.lock();
                state.cached.consecutive_errors = 0;
                state.cached.last_error = None;
                info!("Resource {} refreshed", id);
            }
            Err(err) => {
                let delegate = {
                    let mut state = self.state.lock();
                    if err.is_not_modified() {
                        state.cached.consecutive_errors = 0;
                    } else {
                        state.cached.consecutive_errors += 1;
                        warn!(
                            "Resource {} failed to refresh ({} consecutive errors): {}",
                            id, state.cached.consecutive_errors, err
                        );
                    }
                    state.cached.last_error = Some(err.clone());
                    state.delegate.clone()
                };
                if let Some(delegate) = delegate {
                    delegate.did_fail_to_load(&id, &err);
                }
            }
        }

        self.state.lock().cached.last_fetch = Some(self.clock.now());
        true
    }

    /// The last persisted resource, independent of any refresh outcome.
    pub fn read_resource(&self) -> Option<R> {
        let file_name = self.state.lock().parameters.file_name.clone();
        self.storage.retrieve_file(file_name.as_deref())
    }

    /// Installs a delegate and replays the persisted resource to it.
    pub fn set_delegate(&self, delegate: Arc<dyn ResourceRefresherDelegate<R>>) {
        self.state.lock().delegate = Some(delegate);
        if let Some(resource) = self.read_resource() {
            self.on_resource_loaded(&resource);
        }
    }

    pub fn clear_delegate(&self) {
        self.state.lock().delegate = None;
    }

    /// Changes the refresh interval, which also caps the error cooldown.
    pub fn set_refresh_interval(&self, interval: Duration) {
        let mut state = self.state.lock();
        state.parameters.refresh_interval = interval;
        if let Some(cooldown) = state.cooldown.as_mut() {
            cooldown.set_max_interval(interval);
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.state.lock().parameters.refresh_interval
    }

    pub fn cached_state(&self) -> CachedResource {
        self.state.lock().cached.clone()
    }

    pub fn is_file_cached(&self) -> bool {
        self.state.lock().is_file_cached
    }

    fn save_resource(&self, resource: &R) {
        let file_name = self.state.lock().parameters.file_name.clone();
        if let Err(err) = self.storage.save(resource, file_name.as_deref()) {
            warn!("Failed to persist refreshed resource: {}", err);
        }
    }

    fn on_resource_loaded(&self, resource: &R) {
        let (id, delegate) = {
            let mut state = self.state.lock();
            state.is_file_cached = true;
            state.cached.etag = resource.etag().map(str::to_string);
            (state.parameters.id.clone(), state.delegate.clone())
        };
        if let Some(delegate) = delegate {
            delegate.did_load(&id, resource);
        }
    }
}

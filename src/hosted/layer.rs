//! Hosted Data Layer
//!
//! Dispatch validator that augments track requests with externally hosted
//! per-item JSON. A cache miss defers the request and fetches the fragment in
//! the background; the pipeline is asked to dequeue once the fetch settles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::HostedDataCache;
use super::item::HostedDataLayerCacheItem;
use super::request::{DispatchValidator, ModuleDelegate, TrackRequest};
use super::retriever::HostedDataRetriever;
use super::stats::HostedCacheStats;
use crate::clock::{system_clock, Clock};
use crate::config::Config;
use crate::datalayer::TimeUnit;
use crate::error::HostedDataError;
use crate::storage::{DiskStorage, DiskStorageExt};

/// Storage namespace for the persisted cache.
pub const STORAGE_NAMESPACE: &str = "hdl";

pub const ERROR_KEY: &str = "hosted_data_layer_error";
pub const QUEUE_REASON_KEY: &str = "queue_reason";
pub const AWAITING_RESPONSE: &str = "Awaiting HDL response";
pub const RESPONSE_RECEIVED: &str = "HDL Response Received";

// == Settings ==
#[derive(Debug, Clone)]
struct HostedSettings {
    account: String,
    profile: String,
    base_url: String,
    keys: HashMap<String, String>,
    expiry: (i64, TimeUnit),
    max_retries: u32,
    retry_delay_min: Duration,
    retry_delay_max: Duration,
}

impl HostedSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            account: config.account.clone(),
            profile: config.profile.clone(),
            base_url: config.hosted_base_url.trim_end_matches('/').to_string(),
            keys: config.hosted_data_layer_keys.clone(),
            expiry: config.hosted_data_layer_expiry,
            max_retries: config.hosted_max_retries,
            retry_delay_min: config.hosted_retry_delay_min,
            retry_delay_max: config.hosted_retry_delay_max,
        }
    }
}

/// Number of augmented request uuids remembered.
const PROCESSED_HISTORY: usize = 1000;

/// Bounded record of augmented requests; the oldest uuid is forgotten first.
#[derive(Debug, Default)]
struct ProcessedRequests {
    uuids: HashSet<String>,
    order: VecDeque<String>,
}

impl ProcessedRequests {
    fn contains(&self, uuid: &str) -> bool {
        self.uuids.contains(uuid)
    }

    fn insert(&mut self, uuid: String) {
        if !self.uuids.insert(uuid.clone()) {
            return;
        }
        self.order.push_back(uuid);
        while self.order.len() > PROCESSED_HISTORY {
            if let Some(oldest) = self.order.pop_front() {
                self.uuids.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Default)]
struct HostedState {
    cache: HostedDataCache,
    /// Ids that failed terminally or ran out of retries
    failing: HashSet<String>,
    /// Request uuids already augmented from the cache
    processed: ProcessedRequests,
    stats: HostedCacheStats,
    tasks: Vec<JoinHandle<()>>,
    delegate: Option<Weak<dyn ModuleDelegate>>,
    shut_down: bool,
}

struct Inner {
    settings: HostedSettings,
    retriever: Arc<dyn HostedDataRetriever>,
    storage: Arc<dyn DiskStorage>,
    clock: Arc<dyn Clock>,
    state: Mutex<HostedState>,
}

// == Hosted Data Layer ==
pub struct HostedDataLayer {
    inner: Arc<Inner>,
}

impl HostedDataLayer {
    pub fn new(
        config: &Config,
        retriever: Arc<dyn HostedDataRetriever>,
        storage: Arc<dyn DiskStorage>,
    ) -> Self {
        Self::with_clock(config, retriever, storage, system_clock())
    }

    /// Reloads the persisted cache from `storage`.
    pub fn with_clock(
        config: &Config,
        retriever: Arc<dyn HostedDataRetriever>,
        storage: Arc<dyn DiskStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let items: Vec<HostedDataLayerCacheItem> = storage.retrieve().unwrap_or_default();
        let cache = HostedDataCache::from_items(items, config.hosted_cache_size_max);
        let mut stats = HostedCacheStats::new();
        stats.set_total_entries(cache.len());
        debug!("Hosted data layer loaded {} cached items", cache.len());

        Self {
            inner: Arc::new(Inner {
                settings: HostedSettings::from_config(config),
                retriever,
                storage,
                clock,
                state: Mutex::new(HostedState {
                    cache,
                    stats,
                    ..HostedState::default()
                }),
            }),
        }
    }

    /// Registers the pipeline callback. Only a weak reference is kept.
    pub fn set_delegate(&self, delegate: &Arc<dyn ModuleDelegate>) {
        self.inner.state.lock().delegate = Some(Arc::downgrade(delegate));
    }

    pub fn url_for(&self, item_id: &str) -> String {
        self.inner.url_for(item_id)
    }

    /// Drops entries older than the configured window relative to `reference`.
    pub fn expire_cache(&self, reference: DateTime<Utc>) {
        let mut state = self.inner.state.lock();
        self.inner.expire_cache(&mut state, reference);
    }

    /// Aborts in-flight fetches and pending retries; later misses are not deferred.
    pub fn shutdown(&self) {
        let tasks = {
            let mut state = self.inner.state.lock();
            state.shut_down = true;
            std::mem::take(&mut state.tasks)
        };
        if !tasks.is_empty() {
            info!("Hosted data layer cancelling {} pending fetches", tasks.len());
        }
        for task in tasks {
            task.abort();
        }
    }

    pub fn stats(&self) -> HostedCacheStats {
        self.inner.state.lock().stats.clone()
    }

    pub fn cached_ids(&self) -> Vec<String> {
        self.inner.state.lock().cache.ids()
    }

    pub fn cached_data(&self, item_id: &str) -> Option<Map<String, Value>> {
        self.inner
            .state
            .lock()
            .cache
            .get(item_id)
            .map(|item| item.data.clone())
    }

    pub fn is_failing(&self, item_id: &str) -> bool {
        self.inner.state.lock().failing.contains(item_id)
    }

    /// Fetch tasks that have not finished yet.
    pub fn pending_fetches(&self) -> usize {
        self.inner
            .state
            .lock()
            .tasks
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    fn item_id_for(&self, request: &TrackRequest) -> Option<String> {
        let key = request.extract_key(&self.inner.settings.keys)?;
        request
            .extract_lookup_value(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

impl DispatchValidator for HostedDataLayer {
    // == Should Queue ==
    fn should_queue(&self, request: &TrackRequest) -> (bool, Option<Map<String, Value>>) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.processed.contains(&request.uuid) {
            return (false, None);
        }

        let Some(item_id) = self.item_id_for(request) else {
            return (false, None);
        };

        if state.failing.contains(&item_id) {
            return (false, Some(error_payload(&item_id)));
        }

        inner.expire_cache(&mut state, inner.clock.now());

        if let Some(item) = state.cache.get(&item_id) {
            let data = item.data.clone();
            state.processed.insert(request.uuid.clone());
            state.stats.record_hit();
            debug!("Hosted data layer hit for {}", item_id);
            return (false, Some(data));
        }

        if state.shut_down {
            return (false, None);
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime to fetch hosted item {}, sending unaugmented", item_id);
            return (false, None);
        };

        state.stats.record_miss();
        state.tasks.retain(|task| !task.is_finished());
        let url = inner.url_for(&item_id);
        debug!("Hosted data layer miss for {}, fetching {}", item_id, url);
        let task = runtime.spawn(retrieve_and_retry(Arc::clone(inner), url, item_id));
        state.tasks.push(task);

        let mut payload = Map::new();
        payload.insert(QUEUE_REASON_KEY.to_string(), json!(AWAITING_RESPONSE));
        (true, Some(payload))
    }

    fn should_drop(&self, _request: &TrackRequest) -> bool {
        false
    }

    fn should_purge(&self, _request: &TrackRequest) -> bool {
        false
    }
}

impl Drop for HostedDataLayer {
    fn drop(&mut self) {
        for task in self.inner.state.lock().tasks.drain(..) {
            task.abort();
        }
    }
}

impl Inner {
    fn url_for(&self, item_id: &str) -> String {
        format!(
            "{}/{}/{}/{}.json",
            self.settings.base_url, self.settings.account, self.settings.profile, item_id
        )
    }

    fn expire_cache(&self, state: &mut HostedState, reference: DateTime<Utc>) {
        if state.cache.is_empty() {
            return;
        }
        let (amount, unit) = self.settings.expiry;
        let since = unit.offset(reference, -amount);
        let expired = state.cache.expire(since);
        if !expired.is_empty() {
            debug!("Expired hosted items {:?}", expired);
            state.stats.record_evictions(expired.len());
            state.stats.set_total_entries(state.cache.len());
            self.persist(state);
        }
    }

    fn store(&self, item_id: &str, data: Map<String, Value>) -> Option<Arc<dyn ModuleDelegate>> {
        let mut state = self.state.lock();
        let item = HostedDataLayerCacheItem::new(item_id, data, self.clock.now());
        let evicted = state.cache.insert(item);
        if !evicted.is_empty() {
            debug!("Evicted hosted items {:?}", evicted);
        }
        state.stats.record_evictions(evicted.len());
        let len = state.cache.len();
        state.stats.set_total_entries(len);
        self.persist(&state);
        state.delegate.as_ref().and_then(Weak::upgrade)
    }

    fn blacklist(&self, item_id: &str, err: &HostedDataError) -> Option<Arc<dyn ModuleDelegate>> {
        warn!("Hosted item {} marked as failing: {}", item_id, err);
        let mut state = self.state.lock();
        if state.failing.insert(item_id.to_string()) {
            state.stats.record_failure();
        }
        state.delegate.as_ref().and_then(Weak::upgrade)
    }

    fn persist(&self, state: &HostedState) {
        if let Err(err) = self.storage.save(&state.cache.to_items(), None) {
            warn!("Failed to persist hosted data cache: {}", err);
        }
    }
}

// == Retrieve And Retry ==
async fn retrieve_and_retry(inner: Arc<Inner>, url: String, item_id: String) {
    let mut retries = 0;
    loop {
        match inner.retriever.get_data(&url).await {
            Ok(data) => {
                info!("Hosted item {} retrieved", item_id);
                if let Some(delegate) = inner.store(&item_id, data) {
                    delegate.request_dequeue(RESPONSE_RECEIVED);
                }
                return;
            }
            Err(err) if !err.is_terminal() && retries < inner.settings.max_retries => {
                retries += 1;
                let delay = jittered_delay(
                    inner.settings.retry_delay_min,
                    inner.settings.retry_delay_max,
                );
                debug!(
                    "Hosted item {} fetch failed ({}), retry {} in {:?}",
                    item_id, err, retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if let Some(delegate) = inner.blacklist(&item_id, &err) {
                    delegate.request_dequeue(&HostedDataError::Blacklisted(item_id).to_string());
                }
                return;
            }
        }
    }
}

/// Uniform delay in `[min, max)`; `min` when the range is empty.
fn jittered_delay(min: Duration, max: Duration) -> Duration {
    if min >= max {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis()..max.as_millis());
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

fn error_payload(item_id: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(
        ERROR_KEY.to_string(),
        json!(HostedDataError::Blacklisted(item_id.to_string()).to_string()),
    );
    payload
}

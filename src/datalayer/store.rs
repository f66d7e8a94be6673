//! Data Layer Store
//!
//! Canonical key/value enrichment store. Items are held in memory behind a
//! reader/writer lock and written through to the injected disk collaborator
//! after every mutation.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{DataLayerEvent, EventBus};
use super::session::{SessionSettings, SessionStarter, SessionState, SESSION_ACTIVITY_FILE};
use super::*;
use crate::clock::{system_clock, Clock};
use crate::config::Config;
use crate::storage::{DiskStorage, DiskStorageExt};

/// Mutable contents guarded by the reader/writer lock.
#[derive(Debug, Default)]
pub(super) struct DataLayerState {
    /// Durable items, written through to storage
    pub(super) items: ItemSet,
    /// Process-lifetime mirror of every `UntilRestart` pair
    pub(super) restart_data: Map<String, Value>,
}

// == Data Layer ==
/// Persistent enrichment store.
///
/// Reads take the read lock and run concurrently; writes take the write lock
/// and are visible to every read issued after they return. Change events are
/// published after the lock has been released.
pub struct DataLayer {
    pub(super) state: RwLock<DataLayerState>,
    pub(super) session: Mutex<SessionState>,
    pub(super) settings: SessionSettings,
    pub(super) session_starter: Arc<dyn SessionStarter>,
    pub(super) storage: Arc<dyn DiskStorage>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: EventBus,
}

impl DataLayer {
    // == Constructor ==
    /// Creates a data layer over `storage` using the wall clock.
    pub fn new(
        config: &Config,
        storage: Arc<dyn DiskStorage>,
        session_starter: Arc<dyn SessionStarter>,
    ) -> Self {
        Self::with_clock(config, storage, session_starter, system_clock())
    }

    /// Creates a data layer with an explicit time source.
    ///
    /// Unreadable persisted data is treated as an empty store. Static library
    /// data is added for the lifetime of the process. A new session is started
    /// when none survives from a previous run or the persisted one has been
    /// idle for longer than the session timeout.
    pub fn with_clock(
        config: &Config,
        storage: Arc<dyn DiskStorage>,
        session_starter: Arc<dyn SessionStarter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let items = storage
            .retrieve::<Vec<DataLayerItem>>()
            .map(ItemSet::from_items)
            .unwrap_or_default();
        let last_activity = storage.retrieve_file::<DateTime<Utc>>(Some(SESSION_ACTIVITY_FILE));
        debug!("Data layer loaded {} persisted items", items.len());

        let data_layer = Self {
            state: RwLock::new(DataLayerState {
                items,
                restart_data: Map::new(),
            }),
            session: Mutex::new(SessionState::new(
                config.tag_management_enabled,
                last_activity,
            )),
            settings: SessionSettings::from_config(config),
            session_starter,
            storage,
            clock,
            events: EventBus::new(),
        };

        data_layer.add(static_data(config), Expiry::UntilRestart);
        let now = data_layer.clock.now();
        if data_layer.session_id().is_none() || data_layer.is_session_idle(now) {
            data_layer.refresh_session_data();
        }
        data_layer
    }

    // == Subscribe ==
    /// Returns a receiver for change events. Drop it to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<DataLayerEvent> {
        self.events.subscribe()
    }

    // == Add ==
    /// Merges `data` into the store with the given expiry.
    ///
    /// `UntilRestart` pairs also go into the restart mirror, and the whole
    /// mirror is re-inserted. Any other expiry removes its keys from the mirror,
    /// so the most recent write of a key wins whatever its expiry class.
    pub fn add(&self, data: Map<String, Value>, expiry: Expiry) {
        if data.is_empty() {
            return;
        }
        let now = self.clock.now();
        let expired = {
            let mut state = self.state.write();
            let date = expiry.resolve(now);
            match expiry {
                Expiry::UntilRestart => {
                    state
                        .restart_data
                        .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
                    let restart_data = state.restart_data.clone();
                    state.items.insert_from(&restart_data, date);
                }
                _ => {
                    for key in data.keys() {
                        state.restart_data.remove(key);
                    }
                    state.items.insert_from(&data, date);
                }
            }
            self.persist(&mut state, now)
        };

        self.events.publish(DataLayerEvent::Updated(data));
        self.events.publish_removed(expired);
    }

    /// Adds a single pair.
    pub fn add_value(&self, key: impl Into<String>, value: Value, expiry: Expiry) {
        let mut data = Map::new();
        data.insert(key.into(), value);
        self.add(data, expiry);
    }

    // == All ==
    /// Snapshot of everything an outgoing event is enriched with.
    ///
    /// Live persisted items, the restart mirror, a fresh random nonce, and the
    /// current timestamps unless the store already supplies them.
    pub fn all(&self) -> Map<String, Value> {
        let now = self.clock.now();
        let mut all = {
            let state = self.state.read();
            let mut all = state.items.live(now);
            all.extend(state.restart_data.iter().map(|(k, v)| (k.clone(), v.clone())));
            all
        };
        decorate(&mut all, now);
        all
    }

    /// Snapshot of the live persisted items plus nonce and timestamps.
    pub fn session_data(&self) -> Map<String, Value> {
        let now = self.clock.now();
        let mut data = self.state.read().items.live(now);
        decorate(&mut data, now);
        data
    }

    /// Returns the live value for `key`, checking the restart mirror last.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let state = self.state.read();
        state
            .items
            .live_value(key, now)
            .or_else(|| state.restart_data.get(key))
            .cloned()
    }

    /// Returns the subset of `keys` currently present, in input order.
    pub fn filter_keys_in_data_layer<S: AsRef<str>>(&self, keys: &[S]) -> Vec<String> {
        let now = self.clock.now();
        let state = self.state.read();
        keys.iter()
            .map(AsRef::as_ref)
            .filter(|key| {
                state.items.live_value(key, now).is_some() || state.restart_data.contains_key(*key)
            })
            .map(str::to_string)
            .collect()
    }

    // == Delete ==
    /// Removes `keys` from the store and the restart mirror.
    ///
    /// A removal event is published only when at least one key was present.
    pub fn delete<S: AsRef<str>>(&self, keys: &[S]) {
        let now = self.clock.now();
        let (removed, expired) = {
            let mut state = self.state.write();
            let mut removed = Vec::new();
            for key in keys.iter().map(AsRef::as_ref) {
                let in_items = state
                    .items
                    .remove(key)
                    .is_some_and(|item| !item.is_expired(now));
                let in_restart = state.restart_data.remove(key).is_some();
                if in_items || in_restart {
                    removed.push(key.to_string());
                }
            }
            let expired = self.persist(&mut state, now);
            (removed, expired)
        };

        if removed.is_empty() {
            debug!("Delete requested for keys that are not present");
        }
        self.events.publish_removed(removed);
        self.events.publish_removed(expired);
    }

    /// Removes a single key.
    pub fn delete_key(&self, key: &str) {
        self.delete(&[key]);
    }

    /// Removes everything, publishing one removal event with every key that
    /// was present.
    pub fn delete_all(&self) {
        let now = self.clock.now();
        let removed = {
            let mut state = self.state.write();
            let mut removed: Vec<String> = state
                .items
                .to_items()
                .into_iter()
                .filter(|item| !item.is_expired(now) || state.restart_data.contains_key(&item.key))
                .map(|item| item.key)
                .collect();
            for key in state.restart_data.keys() {
                if !removed.contains(key) {
                    removed.push(key.clone());
                }
            }
            state.items.clear();
            state.restart_data.clear();
            self.persist(&mut state, now);
            removed
        };

        info!("Data layer cleared, {} keys removed", removed.len());
        self.events.publish_removed(removed);
    }

    // == Sweep Expired ==
    /// Re-inserts the restart mirror and drops every date-expired item.
    ///
    /// Returns the number of expired keys removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired = {
            let mut state = self.state.write();
            let restart_data = state.restart_data.clone();
            state
                .items
                .insert_from(&restart_data, Expiry::UntilRestart.resolve(now));
            self.persist(&mut state, now)
        };
        let count = expired.len();
        self.events.publish_removed(expired);
        count
    }

    // == Persist ==
    /// Drops expired items and writes the remainder to storage.
    ///
    /// Returns the expired keys that are not backed by the restart mirror.
    pub(super) fn persist(&self, state: &mut DataLayerState, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = state
            .items
            .remove_expired(now)
            .into_iter()
            .filter(|key| !state.restart_data.contains_key(key))
            .collect();
        if !expired.is_empty() {
            debug!("Removed {} expired data layer items", expired.len());
        }

        if let Err(err) = self.storage.save(&state.items.to_items(), None) {
            warn!("Failed to persist data layer: {}", err);
        }
        expired
    }
}

/// Library data present on every event for the lifetime of the process.
fn static_data(config: &Config) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(ACCOUNT_KEY.to_string(), json!(config.account));
    data.insert(PROFILE_KEY.to_string(), json!(config.profile));
    data.insert(ENVIRONMENT_KEY.to_string(), json!(config.environment));
    data.insert(LIBRARY_NAME_KEY.to_string(), json!(LIBRARY_NAME));
    data.insert(LIBRARY_VERSION_KEY.to_string(), json!(LIBRARY_VERSION));
    data.insert(ORIGIN_KEY.to_string(), json!(ORIGIN_MOBILE));
    if let Some(data_source) = &config.data_source {
        data.insert(DATA_SOURCE_KEY.to_string(), json!(data_source));
    }
    data
}

/// Adds the nonce and, unless all are already present, the timestamps.
fn decorate(data: &mut Map<String, Value>, now: DateTime<Utc>) {
    data.insert(RANDOM_KEY.to_string(), json!(random_nonce()));
    if !current_timestamps_exist(data) {
        data.extend(current_timestamps(now));
    }
}

fn current_timestamps_exist(data: &Map<String, Value>) -> bool {
    [
        TIMESTAMP_EPOCH_KEY,
        TIMESTAMP_KEY,
        TIMESTAMP_LOCAL_KEY,
        TIMESTAMP_OFFSET_KEY,
        TIMESTAMP_UNIX_KEY,
    ]
    .iter()
    .all(|key| data.contains_key(*key))
}

pub(super) fn current_timestamps(now: DateTime<Utc>) -> Map<String, Value> {
    let local = now.with_timezone(&Local);
    let offset_hours = local.offset().local_minus_utc() / 3600;

    let mut timestamps = Map::new();
    timestamps.insert(TIMESTAMP_EPOCH_KEY.to_string(), json!(now.timestamp().to_string()));
    timestamps.insert(
        TIMESTAMP_KEY.to_string(),
        json!(now.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
    );
    timestamps.insert(
        TIMESTAMP_LOCAL_KEY.to_string(),
        json!(local.format("%Y-%m-%dT%H:%M:%S").to_string()),
    );
    timestamps.insert(TIMESTAMP_OFFSET_KEY.to_string(), json!(offset_hours.to_string()));
    timestamps.insert(TIMESTAMP_UNIX_KEY.to_string(), json!(now.timestamp().to_string()));
    timestamps.insert(
        TIMESTAMP_UNIX_MILLISECONDS_KEY.to_string(),
        json!(now.timestamp_millis().to_string()),
    );
    timestamps
}

/// Sixteen random decimal digits.
fn random_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

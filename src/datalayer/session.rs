//! Session Manager
//!
//! Session id lifecycle on top of the data layer, plus the optional
//! out-of-band session registration call.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use super::store::DataLayer;
use super::{Expiry, SESSION_ID_KEY};
use crate::config::Config;
use crate::error::SessionError;
use crate::network::{HttpClient, HttpRequest};
use crate::storage::DiskStorageExt;

/// Storage slot holding the instant of the last session activity.
pub(crate) const SESSION_ACTIVITY_FILE: &str = "session_activity";

// == Session Starter ==
/// Registers a new session with the tag management backend.
#[async_trait]
pub trait SessionStarter: Send + Sync {
    async fn request_session(&self) -> Result<(), SessionError>;
}

/// [`SessionStarter`] that issues the registration GET through an [`HttpClient`].
pub struct HttpSessionStarter {
    client: Arc<dyn HttpClient>,
    base_url: String,
    account: String,
    profile: String,
}

impl HttpSessionStarter {
    pub fn new(config: &Config, client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            base_url: config.session_base_url.clone(),
            account: config.account.clone(),
            profile: config.profile.clone(),
        }
    }

    /// `{base}{account}/{profile}/{ms}&cb={ms}`
    pub fn session_url(&self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis();
        format!(
            "{}{}/{}/{}&cb={}",
            self.base_url, self.account, self.profile, millis, millis
        )
    }
}

#[async_trait]
impl SessionStarter for HttpSessionStarter {
    async fn request_session(&self) -> Result<(), SessionError> {
        let request = HttpRequest::get(self.session_url(Utc::now()));
        let response = self
            .client
            .send(request)
            .await
            .map_err(|err| SessionError::ErrorInRequest(err.to_string()))?;
        if response.is_success() {
            Ok(())
        } else {
            Err(SessionError::InvalidResponse(response.status))
        }
    }
}

/// Timing thresholds copied out of [`Config`].
#[derive(Debug, Clone, Copy)]
pub(super) struct SessionSettings {
    pub(super) seconds_between_track_events: i64,
    pub(super) minutes_between_sessions: i64,
    pub(super) session_counting_enabled: bool,
}

impl SessionSettings {
    pub(super) fn from_config(config: &Config) -> Self {
        Self {
            seconds_between_track_events: config.seconds_between_track_events,
            minutes_between_sessions: config.minutes_between_sessions,
            session_counting_enabled: config.session_counting_enabled,
        }
    }
}

/// Track counters for the current session.
#[derive(Debug, Default)]
pub(super) struct SessionState {
    pub(super) last_track_date: Option<DateTime<Utc>>,
    /// Last track or session start, persisted so idle gaps span restarts
    pub(super) last_activity: Option<DateTime<Utc>>,
    pub(super) number_of_tracks: u64,
    pub(super) should_trigger_session_request: bool,
    pub(super) tag_management_enabled: bool,
}

impl SessionState {
    pub(super) fn new(tag_management_enabled: bool, last_activity: Option<DateTime<Utc>>) -> Self {
        Self {
            tag_management_enabled,
            last_activity,
            ..Self::default()
        }
    }
}

impl DataLayer {
    // == Session Id ==
    /// The id of the active session, if one is live.
    pub fn session_id(&self) -> Option<String> {
        let now = self.clock.now();
        self.state
            .read()
            .items
            .live_value(SESSION_ID_KEY, now)
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.add_value(SESSION_ID_KEY, json!(session_id.into()), Expiry::Session);
    }

    // == End Session ==
    /// Removes every session scoped item.
    pub fn end_session(&self) {
        let now = self.clock.now();
        let (removed, expired) = {
            let mut state = self.state.write();
            let removed = state.items.remove_session_data();
            let expired = self.persist(&mut state, now);
            (removed, expired)
        };
        self.events.publish_removed(removed);
        self.events.publish_removed(expired);
    }

    /// Ends the current session and starts a new one that still has to be
    /// registered.
    pub fn refresh_session_data(&self) {
        self.end_session();
        let session_id = self.clock.now().timestamp_millis().to_string();
        info!("Starting session {}", session_id);
        self.set_session_id(session_id);

        let now = self.clock.now();
        {
            let mut session = self.session.lock();
            session.should_trigger_session_request = true;
            session.number_of_tracks = 0;
            session.last_track_date = None;
        }
        self.record_activity(now);
    }

    /// True when the last recorded activity is older than the session
    /// timeout, or when there is no record of it at all.
    pub(super) fn is_session_idle(&self, now: DateTime<Utc>) -> bool {
        let timeout = Duration::minutes(self.settings.minutes_between_sessions);
        self.session
            .lock()
            .last_activity
            .map_or(true, |last| now - last > timeout)
    }

    fn record_activity(&self, now: DateTime<Utc>) {
        self.session.lock().last_activity = Some(now);
        if let Err(err) = self.storage.save(&now, Some(SESSION_ACTIVITY_FILE)) {
            warn!("Failed to persist session activity: {}", err);
        }
    }

    // == Refresh Session ==
    /// Records a track call and keeps the session current.
    ///
    /// Starts a new session when none exists or the previous track is older
    /// than the session timeout, and registers the session when two tracks
    /// arrive within the burst window.
    pub async fn refresh_session(&self) {
        let now = self.clock.now();
        if self.new_track_request(now) {
            self.start_new_session().await;
        }
    }

    /// Updates the track counters. Returns true when the session should be
    /// registered.
    pub(super) fn new_track_request(&self, now: DateTime<Utc>) -> bool {
        if self.is_session_idle(now) || self.session_id().is_none() {
            self.refresh_session_data();
        }

        let register = {
            let mut session = self.session.lock();
            let burst = Duration::seconds(self.settings.seconds_between_track_events);
            let register = match session.last_track_date {
                Some(last) if now - last < burst => true,
                Some(_) => {
                    session.number_of_tracks = 0;
                    false
                }
                None => false,
            };
            session.last_track_date = Some(now);
            session.number_of_tracks += 1;
            register
        };
        self.record_activity(now);
        register
    }

    /// Registers the pending session when tag management and session
    /// counting are both enabled. A failed call leaves the trigger pending.
    pub async fn start_new_session(&self) {
        let pending = {
            let session = self.session.lock();
            session.tag_management_enabled
                && session.should_trigger_session_request
                && self.settings.session_counting_enabled
        };
        if !pending {
            return;
        }

        match self.session_starter.request_session().await {
            Ok(()) => {
                debug!("Session registered");
                let mut session = self.session.lock();
                session.should_trigger_session_request = false;
                session.number_of_tracks = 0;
                session.last_track_date = None;
            }
            Err(err) => warn!("Session registration failed, will retry: {}", err),
        }
    }

    pub fn should_trigger_session_request(&self) -> bool {
        self.session.lock().should_trigger_session_request
    }

    pub fn number_of_tracks(&self) -> u64 {
        self.session.lock().number_of_tracks
    }

    pub fn last_track_date(&self) -> Option<DateTime<Utc>> {
        self.session.lock().last_track_date
    }

    pub fn set_tag_management_enabled(&self, enabled: bool) {
        self.session.lock().tag_management_enabled = enabled;
    }
}

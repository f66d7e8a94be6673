//! Error cooldown
//!
//! Throttles refreshes after consecutive failures: each error widens the
//! window by `base_interval`, never past `max_interval`.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCooldown {
    base_interval: Duration,
    max_interval: Duration,
}

impl ErrorCooldown {
    /// Returns `None` without a base interval; no cooldown applies then.
    pub fn new(base_interval: Option<Duration>, max_interval: Duration) -> Option<Self> {
        base_interval.map(|base_interval| Self {
            base_interval,
            max_interval,
        })
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn set_max_interval(&mut self, max_interval: Duration) {
        self.max_interval = max_interval;
    }

    /// `min(max_interval, base_interval * consecutive_errors)`
    pub fn cooldown_interval(&self, consecutive_errors: u32) -> Duration {
        self.base_interval
            .saturating_mul(consecutive_errors)
            .min(self.max_interval)
    }

    pub fn is_in_cooldown(
        &self,
        last_fetch: DateTime<Utc>,
        consecutive_errors: u32,
        now: DateTime<Utc>,
    ) -> bool {
        if consecutive_errors == 0 {
            return false;
        }
        now < add_duration(last_fetch, self.cooldown_interval(consecutive_errors))
    }
}

/// Adds a std duration to an instant, saturating at the far future.
pub(crate) fn add_duration(date: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|duration| date.checked_add_signed(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

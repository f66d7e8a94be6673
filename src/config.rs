//! Configuration Module
//!
//! Handles loading and managing store configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::datalayer::TimeUnit;

/// Store configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Account the events belong to
    pub account: String,
    /// Profile within the account
    pub profile: String,
    /// Publishing environment (dev, qa, prod)
    pub environment: String,
    /// Optional data source key added to every event
    pub data_source: Option<String>,
    /// Two tracks closer than this trigger session registration
    pub seconds_between_track_events: i64,
    /// Idle minutes after which a new session starts
    pub minutes_between_sessions: i64,
    /// Whether session registration calls are made at all
    pub session_counting_enabled: bool,
    /// Whether the tag management collaborator is active
    pub tag_management_enabled: bool,
    /// Prefix of the session registration URL
    pub session_base_url: String,
    /// Event name to payload key used as hosted data layer item id
    pub hosted_data_layer_keys: HashMap<String, String>,
    /// Maximum age of a hosted data layer cache entry
    pub hosted_data_layer_expiry: (i64, TimeUnit),
    /// Base URL of hosted data layer fragments, without trailing slash
    pub hosted_base_url: String,
    /// Maximum number of hosted data layer cache entries
    pub hosted_cache_size_max: usize,
    /// Retries after the first failed hosted data layer fetch
    pub hosted_max_retries: u32,
    /// Lower bound of the jittered retry delay
    pub hosted_retry_delay_min: Duration,
    /// Upper bound (exclusive) of the jittered retry delay
    pub hosted_retry_delay_max: Duration,
    /// Background expiry sweep interval
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ACCOUNT`, `PROFILE`, `ENVIRONMENT`, `DATA_SOURCE`
    /// - `SECONDS_BETWEEN_TRACK_EVENTS` (default: 30)
    /// - `MINUTES_BETWEEN_SESSIONS` (default: 30)
    /// - `SESSION_COUNTING_ENABLED`, `TAG_MANAGEMENT_ENABLED` (true/false)
    /// - `SESSION_BASE_URL`
    /// - `HOSTED_DATA_LAYER_KEYS` - comma separated `event:key` pairs
    /// - `HOSTED_DATA_LAYER_EXPIRY` - amount plus unit suffix, e.g. `7d` (default)
    /// - `HOSTED_BASE_URL`
    /// - `HOSTED_CACHE_SIZE_MAX` (default: 50)
    /// - `HOSTED_MAX_RETRIES` (default: 3)
    /// - `HOSTED_RETRY_DELAY_MIN`, `HOSTED_RETRY_DELAY_MAX` in seconds (default: 10, 30)
    /// - `CLEANUP_INTERVAL` in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            account: env::var("ACCOUNT").unwrap_or(defaults.account),
            profile: env::var("PROFILE").unwrap_or(defaults.profile),
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            data_source: env::var("DATA_SOURCE").ok().or(defaults.data_source),
            seconds_between_track_events: parse_var("SECONDS_BETWEEN_TRACK_EVENTS")
                .unwrap_or(defaults.seconds_between_track_events),
            minutes_between_sessions: parse_var("MINUTES_BETWEEN_SESSIONS")
                .unwrap_or(defaults.minutes_between_sessions),
            session_counting_enabled: parse_var("SESSION_COUNTING_ENABLED")
                .unwrap_or(defaults.session_counting_enabled),
            tag_management_enabled: parse_var("TAG_MANAGEMENT_ENABLED")
                .unwrap_or(defaults.tag_management_enabled),
            session_base_url: env::var("SESSION_BASE_URL").unwrap_or(defaults.session_base_url),
            hosted_data_layer_keys: env::var("HOSTED_DATA_LAYER_KEYS")
                .ok()
                .map(|v| parse_key_map(&v))
                .unwrap_or(defaults.hosted_data_layer_keys),
            hosted_data_layer_expiry: env::var("HOSTED_DATA_LAYER_EXPIRY")
                .ok()
                .and_then(|v| parse_expiry(&v))
                .unwrap_or(defaults.hosted_data_layer_expiry),
            hosted_base_url: env::var("HOSTED_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.hosted_base_url),
            hosted_cache_size_max: parse_var("HOSTED_CACHE_SIZE_MAX")
                .unwrap_or(defaults.hosted_cache_size_max),
            hosted_max_retries: parse_var("HOSTED_MAX_RETRIES")
                .unwrap_or(defaults.hosted_max_retries),
            hosted_retry_delay_min: parse_var("HOSTED_RETRY_DELAY_MIN")
                .map(Duration::from_secs)
                .unwrap_or(defaults.hosted_retry_delay_min),
            hosted_retry_delay_max: parse_var("HOSTED_RETRY_DELAY_MAX")
                .map(Duration::from_secs)
                .unwrap_or(defaults.hosted_retry_delay_max),
            cleanup_interval: parse_var("CLEANUP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: "account".to_string(),
            profile: "main".to_string(),
            environment: "prod".to_string(),
            data_source: None,
            seconds_between_track_events: 30,
            minutes_between_sessions: 30,
            session_counting_enabled: true,
            tag_management_enabled: false,
            session_base_url: "https://tags.tiqcdn.com/utag/tiqapp/utag.v.js?a=".to_string(),
            hosted_data_layer_keys: HashMap::new(),
            hosted_data_layer_expiry: (7, TimeUnit::Days),
            hosted_base_url: "https://tags.tiqcdn.com/dle".to_string(),
            hosted_cache_size_max: 50,
            hosted_max_retries: 3,
            hosted_retry_delay_min: Duration::from_secs(10),
            hosted_retry_delay_max: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parses `event:key,event:key` into a lookup map. Malformed pairs are skipped.
fn parse_key_map(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (event, key) = pair.split_once(':')?;
            let (event, key) = (event.trim(), key.trim());
            if event.is_empty() || key.is_empty() {
                return None;
            }
            Some((event.to_string(), key.to_string()))
        })
        .collect()
}

/// Parses `7d`, `12h`, `30m`, `2M` or `1y`. The amount must be positive.
fn parse_expiry(raw: &str) -> Option<(i64, TimeUnit)> {
    let raw = raw.trim();
    let suffix = raw.chars().last()?;
    let amount: i64 = raw[..raw.len() - suffix.len_utf8()].parse().ok()?;
    if amount <= 0 {
        return None;
    }
    let unit = match suffix {
        'm' => TimeUnit::Minutes,
        'h' => TimeUnit::Hours,
        'd' => TimeUnit::Days,
        'M' => TimeUnit::Months,
        'y' => TimeUnit::Years,
        _ => return None,
    };
    Some((amount, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.seconds_between_track_events, 30);
        assert_eq!(config.minutes_between_sessions, 30);
        assert_eq!(config.hosted_cache_size_max, 50);
        assert_eq!(config.hosted_max_retries, 3);
        assert_eq!(config.hosted_data_layer_expiry, (7, TimeUnit::Days));
        assert_eq!(config.hosted_base_url, "https://tags.tiqcdn.com/dle");
        assert!(config.hosted_data_layer_keys.is_empty());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("HOSTED_CACHE_SIZE_MAX");
        env::remove_var("HOSTED_MAX_RETRIES");
        env::remove_var("MINUTES_BETWEEN_SESSIONS");

        let config = Config::from_env();
        assert_eq!(config.hosted_cache_size_max, 50);
        assert_eq!(config.hosted_max_retries, 3);
        assert_eq!(config.minutes_between_sessions, 30);
    }

    #[test]
    fn test_parse_key_map() {
        let map = parse_key_map("product_view:product_id, category_view : category_id,broken");
        assert_eq!(map.len(), 2);
        assert_eq!(map["product_view"], "product_id");
        assert_eq!(map["category_view"], "category_id");
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(parse_expiry("7d"), Some((7, TimeUnit::Days)));
        assert_eq!(parse_expiry("12h"), Some((12, TimeUnit::Hours)));
        assert_eq!(parse_expiry("30m"), Some((30, TimeUnit::Minutes)));
        assert_eq!(parse_expiry("2M"), Some((2, TimeUnit::Months)));
        assert_eq!(parse_expiry("1y"), Some((1, TimeUnit::Years)));
        assert_eq!(parse_expiry("7w"), None);
        assert_eq!(parse_expiry("d"), None);
        assert_eq!(parse_expiry(""), None);
    }

    #[test]
    fn test_parse_expiry_rejects_non_positive_amounts() {
        assert_eq!(parse_expiry("-7d"), None);
        assert_eq!(parse_expiry("0h"), None);
    }
}

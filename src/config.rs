//! Configuration for the sync engine.
//!
//! # Example
//!
//! ```
//! use event_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.limit, 500);
//! assert_eq!(config.fresh_window_ms, 5 * 60 * 1000); // 5 minutes
//!
//! // Polling instead of real-time
//! let config = SyncConfig {
//!     endpoint: "https://dashboard.example/api/events".into(),
//!     realtime_enabled: false,
//!     poll_interval_ms: 60_000,
//!     ..Default::default()
//! };
//! assert!(config.poll_interval().is_some());
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::resilience::retry::RetryConfig;

/// Configuration for the sync engine.
///
/// All fields have sensible defaults. The thresholds are product-tuned
/// values, not correctness bounds, so every one of them is overridable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// Snapshot endpoint URL (used by `HttpSnapshotFetcher`)
    #[serde(default)]
    pub endpoint: String,

    /// Maximum collection length, also sent as the snapshot `limit`
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Key of the persisted snapshot blob
    #[serde(default = "default_cache_key")]
    pub cache_key: String,

    /// Cached snapshots younger than this are served without revalidation
    #[serde(default = "default_fresh_window_ms")]
    pub fresh_window_ms: u64,

    /// Cached snapshots older than this are evicted on load
    #[serde(default = "default_stale_ceiling_ms")]
    pub stale_ceiling_ms: u64,

    /// Retry settings for snapshot fetches
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout (0 = none)
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Attach the real-time change stream once ready
    #[serde(default = "default_realtime_enabled")]
    pub realtime_enabled: bool,

    /// Real-time channel name (table name)
    #[serde(default = "default_realtime_channel")]
    pub realtime_channel: String,

    /// Polling interval when real-time is off or unavailable (0 = disabled)
    #[serde(default)]
    pub poll_interval_ms: u64,
}

fn default_limit() -> usize { 500 }
fn default_cache_key() -> String { "event-sync:snapshot".to_string() }
fn default_fresh_window_ms() -> u64 { 5 * 60 * 1000 } // 5 min
fn default_stale_ceiling_ms() -> u64 { 30 * 60 * 1000 } // 30 min
fn default_max_retries() -> usize { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 8000 }
fn default_attempt_timeout_ms() -> u64 { 10_000 }
fn default_realtime_enabled() -> bool { true }
fn default_realtime_channel() -> String { "events".to_string() }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            limit: default_limit(),
            cache_key: default_cache_key(),
            fresh_window_ms: default_fresh_window_ms(),
            stale_ceiling_ms: default_stale_ceiling_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            realtime_enabled: default_realtime_enabled(),
            realtime_channel: default_realtime_channel(),
            poll_interval_ms: 0,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn fresh_window(&self) -> Duration {
        Duration::from_millis(self.fresh_window_ms)
    }

    #[must_use]
    pub fn stale_ceiling(&self) -> Duration {
        Duration::from_millis(self.stale_ceiling_ms)
    }

    /// Polling period, if polling is configured at all.
    #[must_use]
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    /// Retry policy for snapshot fetches.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            factor: 2.0,
            max_retries: self.max_retries,
            attempt_timeout: (self.attempt_timeout_ms > 0)
                .then(|| Duration::from_millis(self.attempt_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_retry_preset() {
        assert_eq!(SyncConfig::default().retry_config(), RetryConfig::snapshot());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SyncConfig = serde_json::from_str(
            r#"{"endpoint": "http://localhost/api/events", "limit": 50, "poll_interval_ms": 30000}"#,
        )
        .unwrap();

        assert_eq!(config.limit, 50);
        assert_eq!(config.poll_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.stale_ceiling(), Duration::from_secs(30 * 60));
        assert_eq!(config.realtime_channel, "events");
        assert!(config.realtime_enabled);
    }

    #[test]
    fn test_polling_disabled_by_default() {
        assert!(SyncConfig::default().poll_interval().is_none());
    }

    #[test]
    fn test_zero_timeout_disables_attempt_timeout() {
        let config = SyncConfig {
            attempt_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.retry_config().attempt_timeout.is_none());
    }
}

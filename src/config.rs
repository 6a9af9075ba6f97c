//! Configuration for the replicator.
//!
//! Configuration is passed to [`Replicator::connect()`](crate::Replicator::connect)
//! and can be constructed programmatically, deserialized from JSON, or built
//! by the `replicate` binary from command-line flags.
//!
//! # Quick Start
//!
//! ```rust
//! use redis_replicator::config::{ReplicatorConfig, ReplicationStrategy};
//!
//! let config = ReplicatorConfig {
//!     strategy: ReplicationStrategy::NoCapture,
//!     ..ReplicatorConfig::for_testing("redis://src:6379", "redis://dst:6379")
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicatorConfig
//! ├── source_url: String            # Copy data from this instance
//! ├── destination_url: String       # Send data to this instance
//! ├── strategy: ReplicationStrategy # monitor | notifications | none
//! ├── scan: ScanConfig              # Bulk SCAN settings
//! ├── capture: CaptureConfig        # Live capture settings
//! ├── commands: CommandTable        # Replay / copy verb buckets
//! └── drain_timeout: String         # Shutdown drain ("10s")
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "source_url": "redis://primary:6379/0",
//!   "destination_url": "redis://standby:6379/0",
//!   "strategy": "monitor",
//!   "scan": { "count": 100, "rate_limit_per_sec": 5000 },
//!   "capture": { "live_error_policy": "log-and-skip" }
//! }
//! ```

use crate::classifier::CommandTable;
use crate::error::{ReplicationError, Result};
use crate::resilience::KeyRate;
use redis::IntoConnectionInfo;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `Replicator::connect()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    /// Redis URL of the instance to copy from. Never written to by the data path.
    pub source_url: String,

    /// Redis URL of the instance to copy into.
    pub destination_url: String,

    /// Live capture mechanism, fixed for the lifetime of a run.
    #[serde(default)]
    pub strategy: ReplicationStrategy,

    /// Bulk scan settings.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Live capture settings.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Verb classification table. Built once, never mutated at runtime.
    #[serde(default)]
    pub commands: CommandTable,

    /// How long `shutdown()` waits for the live consumer to finish its
    /// in-flight action, as a duration string (e.g. "10s").
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout: String,
}

fn default_drain_timeout() -> String {
    "10s".to_string()
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            source_url: "redis://127.0.0.1:6379".to_string(),
            destination_url: "redis://127.0.0.1:6380".to_string(),
            strategy: ReplicationStrategy::default(),
            scan: ScanConfig::default(),
            capture: CaptureConfig::default(),
            commands: CommandTable::default(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

impl ReplicatorConfig {
    /// Create a minimal config for testing.
    pub fn for_testing(source_url: &str, destination_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            destination_url: destination_url.to_string(),
            drain_timeout: "1s".to_string(),
            ..Default::default()
        }
    }

    /// Parse the drain timeout string to a Duration.
    pub fn drain_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.drain_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Database index selected by the source URL (`redis://host/3` → 3).
    pub fn source_db(&self) -> Result<i64> {
        let info = self
            .source_url
            .as_str()
            .into_connection_info()
            .map_err(|e| ReplicationError::Config(format!("invalid source URL: {}", e)))?;
        Ok(info.redis.db)
    }

    /// Check the configuration before any connection is opened.
    pub fn validate(&self) -> Result<()> {
        if self.source_url.trim().is_empty() {
            return Err(ReplicationError::Config("source URL is empty".to_string()));
        }
        if self.destination_url.trim().is_empty() {
            return Err(ReplicationError::Config("destination URL is empty".to_string()));
        }
        if self.scan.count == 0 {
            return Err(ReplicationError::Config("scan count must be a positive integer".to_string()));
        }
        if self.scan.rate_limit_per_sec == Some(0) {
            return Err(ReplicationError::Config("scan rate limit must be positive when set".to_string()));
        }
        if self.capture.channel_capacity == 0 {
            return Err(ReplicationError::Config("capture channel capacity must be positive".to_string()));
        }
        if humantime::parse_duration(&self.drain_timeout).is_err() {
            return Err(ReplicationError::Config(format!(
                "invalid drain timeout: {:?}",
                self.drain_timeout
            )));
        }
        self.source_db()?;
        self.commands.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationStrategy
// ═══════════════════════════════════════════════════════════════════════════════

/// Mechanism used to observe live mutations on the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReplicationStrategy {
    /// Tap the MONITOR feed of every command executed on the source.
    #[default]
    #[serde(rename = "monitor")]
    CommandStreamCapture,

    /// Subscribe to keyevent notifications (`__keyevent@<db>__:*`).
    #[serde(rename = "notifications")]
    NotificationCapture,

    /// One-shot snapshot: bulk scan only, then exit.
    #[serde(rename = "none")]
    NoCapture,
}

impl ReplicationStrategy {
    /// Whether this strategy keeps the run alive after the bulk scan.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, ReplicationStrategy::NoCapture)
    }
}

impl std::fmt::Display for ReplicationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommandStreamCapture => write!(f, "monitor"),
            Self::NotificationCapture => write!(f, "notifications"),
            Self::NoCapture => write!(f, "none"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ScanConfig: bulk SCAN settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Bulk scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// COUNT hint passed to SCAN. Advisory only: the store may return more
    /// or fewer keys per batch.
    #[serde(default = "default_scan_count")]
    pub count: usize,

    /// Optional MATCH pattern. `None` scans the whole keyspace.
    #[serde(default)]
    pub match_pattern: Option<String>,

    /// Optional cap on keys copied per second, to protect the source.
    #[serde(default)]
    pub rate_limit_per_sec: Option<u32>,
}

fn default_scan_count() -> usize {
    10
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            count: 10,
            match_pattern: None,
            rate_limit_per_sec: None,
        }
    }
}

impl ScanConfig {
    /// Scan throttle rate, or `None` when unthrottled.
    pub fn key_rate(&self) -> Option<KeyRate> {
        self.rate_limit_per_sec.and_then(KeyRate::per_second)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CaptureConfig: live capture settings
// ═══════════════════════════════════════════════════════════════════════════════

/// What to do when applying a live event fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LiveErrorPolicy {
    /// Abort the run on the first failed live event.
    #[default]
    FailFast,

    /// Log the failure, count it, and continue with the next event.
    /// Connection errors still abort.
    LogAndSkip,
}

/// Live capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capacity of the channel between the capture reader and the live
    /// consumer. A full channel pauses the reader.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// PSUBSCRIBE pattern for notification capture. Defaults to
    /// `__keyevent@<db>__:*` for the source URL's database.
    #[serde(default)]
    pub notification_pattern: Option<String>,

    /// Whether to `CONFIG SET notify-keyspace-events` on the source before
    /// subscribing.
    #[serde(default = "default_true")]
    pub configure_notifications: bool,

    /// Value written to `notify-keyspace-events` when
    /// `configure_notifications` is set.
    #[serde(default = "default_notify_keyspace_events")]
    pub notify_keyspace_events: String,

    /// Failure policy for live events.
    #[serde(default)]
    pub live_error_policy: LiveErrorPolicy,
}

fn default_channel_capacity() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_notify_keyspace_events() -> String {
    "EA".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
            notification_pattern: None,
            configure_notifications: true,
            notify_keyspace_events: default_notify_keyspace_events(),
            live_error_policy: LiveErrorPolicy::FailFast,
        }
    }
}

impl CaptureConfig {
    /// The PSUBSCRIBE pattern to use for the given database.
    pub fn notification_pattern_for(&self, db: i64) -> String {
        self.notification_pattern
            .clone()
            .unwrap_or_else(|| format!("__keyevent@{}__:*", db))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicator_config_default() {
        let config = ReplicatorConfig::default();
        assert_eq!(config.strategy, ReplicationStrategy::CommandStreamCapture);
        assert_eq!(config.scan.count, 10);
        assert_eq!(config.drain_timeout_duration(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_testing_config() {
        let config = ReplicatorConfig::for_testing("redis://a:6379", "redis://b:6379");
        assert_eq!(config.source_url, "redis://a:6379");
        assert_eq!(config.destination_url, "redis://b:6379");
        assert_eq!(config.drain_timeout_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_zero_scan_count() {
        let mut config = ReplicatorConfig::default();
        config.scan.count = 0;
        assert!(matches!(config.validate(), Err(ReplicationError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_rate_limit() {
        let mut config = ReplicatorConfig::default();
        config.scan.rate_limit_per_sec = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_urls() {
        let mut config = ReplicatorConfig::default();
        config.source_url = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = ReplicatorConfig::default();
        config.destination_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_drain_timeout() {
        let mut config = ReplicatorConfig::default();
        config.drain_timeout = "soon".to_string();
        assert!(config.validate().is_err());
        // Falls back to 10 seconds when read anyway
        assert_eq!(config.drain_timeout_duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_zero_channel_capacity() {
        let mut config = ReplicatorConfig::default();
        config.capture.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_db_from_url() {
        let config = ReplicatorConfig::for_testing("redis://127.0.0.1:6379/3", "redis://127.0.0.1:6380");
        assert_eq!(config.source_db().unwrap(), 3);

        let config = ReplicatorConfig::for_testing("redis://127.0.0.1:6379", "redis://127.0.0.1:6380");
        assert_eq!(config.source_db().unwrap(), 0);
    }

    #[test]
    fn test_source_db_invalid_url() {
        let config = ReplicatorConfig::for_testing("not a url", "redis://127.0.0.1:6380");
        assert!(matches!(config.source_db(), Err(ReplicationError::Config(_))));
    }

    #[test]
    fn test_strategy_display_and_continuity() {
        assert_eq!(ReplicationStrategy::CommandStreamCapture.to_string(), "monitor");
        assert_eq!(ReplicationStrategy::NotificationCapture.to_string(), "notifications");
        assert_eq!(ReplicationStrategy::NoCapture.to_string(), "none");
        assert!(ReplicationStrategy::CommandStreamCapture.is_continuous());
        assert!(ReplicationStrategy::NotificationCapture.is_continuous());
        assert!(!ReplicationStrategy::NoCapture.is_continuous());
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&ReplicationStrategy::NotificationCapture).unwrap();
        assert_eq!(json, "\"notifications\"");
        let parsed: ReplicationStrategy = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, ReplicationStrategy::NoCapture);
    }

    #[test]
    fn test_scan_rate_limit_config() {
        let mut scan = ScanConfig::default();
        assert!(scan.key_rate().is_none());

        scan.rate_limit_per_sec = Some(500);
        let rate = scan.key_rate().unwrap();
        assert_eq!(rate.keys_per_sec.get(), 500);
        assert_eq!(rate.burst.get(), 500);
    }

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.channel_capacity, 10_000);
        assert!(config.configure_notifications);
        assert_eq!(config.notify_keyspace_events, "EA");
        assert_eq!(config.live_error_policy, LiveErrorPolicy::FailFast);
    }

    #[test]
    fn test_notification_pattern_for_db() {
        let mut config = CaptureConfig::default();
        assert_eq!(config.notification_pattern_for(0), "__keyevent@0__:*");
        assert_eq!(config.notification_pattern_for(5), "__keyevent@5__:*");

        config.notification_pattern = Some("__keyevent@*__:*".to_string());
        assert_eq!(config.notification_pattern_for(5), "__keyevent@*__:*");
    }

    #[test]
    fn test_config_json_minimal() {
        let json = r#"{
            "source_url": "redis://primary:6379",
            "destination_url": "redis://standby:6379",
            "strategy": "notifications",
            "capture": { "live_error_policy": "log-and-skip" }
        }"#;
        let config: ReplicatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy, ReplicationStrategy::NotificationCapture);
        assert_eq!(config.capture.live_error_policy, LiveErrorPolicy::LogAndSkip);
        assert_eq!(config.capture.channel_capacity, 10_000);
        assert_eq!(config.scan.count, 10);
        assert_eq!(config.drain_timeout, "10s");
        assert!(config.commands.replay.contains("hset"));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let mut config = ReplicatorConfig::for_testing("redis://a:6379/1", "redis://b:6379/2");
        config.scan.count = 250;
        config.scan.match_pattern = Some("session:*".to_string());

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ReplicatorConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.source_url, "redis://a:6379/1");
        assert_eq!(parsed.scan.count, 250);
        assert_eq!(parsed.scan.match_pattern.as_deref(), Some("session:*"));
        assert_eq!(parsed.commands.replay, config.commands.replay);
    }
}

//! Startup connection backoff and bulk-scan throttling.
//!
//! - [`RetryConfig`]: bounded exponential backoff used while opening the
//!   source and destination connections
//! - [`ScanThrottle`]: token bucket (governor) capping keys copied per second
//!
//! Once a run is underway there is no reconnection layer: a dropped
//! connection ends the run.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() {
//! use redis_replicator::resilience::{KeyRate, ScanThrottle};
//!
//! let rate = KeyRate::per_second(1000).expect("non-zero rate");
//! let throttle = ScanThrottle::new(rate);
//! throttle.acquire().await; // waits once the burst is spent
//! # }
//! ```

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Connection retry schedule.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts before giving up, including the first.
    pub attempts: usize,

    /// Wait after the first failed attempt.
    pub first_delay: Duration,

    /// Ceiling for the growing wait.
    pub max_delay: Duration,

    /// Growth per failed attempt.
    pub factor: f64,

    /// Bound on a single connect, so an unroutable host cannot hang startup.
    pub attempt_timeout: Duration,
}

impl RetryConfig {
    /// Schedule used by `Replicator::connect()`.
    ///
    /// Gives a briefly unavailable instance a few seconds to come up, then
    /// reports the misconfiguration instead of hanging.
    ///
    /// ```text
    /// After attempt  Wait      Cumulative
    /// -------------  ----      ----------
    /// 1              500ms     500ms
    /// 2              750ms     1.25s
    /// 3              1.12s     2.37s
    /// 4              1.69s     4.06s
    /// 5              2.53s     6.59s
    /// 6              give up
    /// ```
    pub fn startup() -> Self {
        Self {
            attempts: 6,
            first_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            factor: 1.5,
            attempt_timeout: Duration::from_secs(10),
        }
    }

    /// Short schedule for tests.
    pub fn testing() -> Self {
        Self {
            attempts: 3,
            first_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            factor: 2.0,
            attempt_timeout: Duration::from_millis(500),
        }
    }

    /// Wait after failed attempt number `attempt` (1-indexed).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.first_delay.as_secs_f64() * self.factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

// =============================================================================
// Scan throttling
// =============================================================================

/// Sustained key rate plus the burst allowed on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRate {
    pub keys_per_sec: NonZeroU32,
    pub burst: NonZeroU32,
}

impl KeyRate {
    /// `keys` per second with a burst of one second's worth. `None` for zero.
    pub fn per_second(keys: u32) -> Option<Self> {
        let keys_per_sec = NonZeroU32::new(keys)?;
        Some(Self {
            keys_per_sec,
            burst: keys_per_sec,
        })
    }
}

/// Token bucket gating each key copy of the bulk scan.
pub struct ScanThrottle {
    bucket: RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    rate: KeyRate,
}

impl std::fmt::Debug for ScanThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanThrottle").field("rate", &self.rate).finish()
    }
}

impl ScanThrottle {
    pub fn new(rate: KeyRate) -> Self {
        let quota = Quota::per_second(rate.keys_per_sec).allow_burst(rate.burst);
        Self {
            bucket: RateLimiter::direct(quota),
            rate,
        }
    }

    /// Wait for a token. Cancel-safe.
    pub async fn acquire(&self) {
        self.bucket.until_ready().await;
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }

    pub fn rate(&self) -> KeyRate {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_schedule() {
        let retry = RetryConfig::startup();
        assert_eq!(retry.attempts, 6);
        assert_eq!(retry.backoff(1), Duration::from_millis(500));
        assert_eq!(retry.backoff(2), Duration::from_millis(750));
    }

    #[test]
    fn test_backoff_grows_then_caps() {
        let retry = RetryConfig {
            attempts: 10,
            first_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            attempt_timeout: Duration::from_secs(5),
        };

        assert_eq!(retry.backoff(0), Duration::from_secs(1));
        assert_eq!(retry.backoff(1), Duration::from_secs(1));
        assert_eq!(retry.backoff(3), Duration::from_secs(4));
        assert_eq!(retry.backoff(5), Duration::from_secs(16));
        assert_eq!(retry.backoff(10), Duration::from_secs(30));
        assert_eq!(retry.backoff(usize::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_key_rate_rejects_zero() {
        assert!(KeyRate::per_second(0).is_none());
        let rate = KeyRate::per_second(250).unwrap();
        assert_eq!(rate.keys_per_sec.get(), 250);
        assert_eq!(rate.burst.get(), 250);
    }

    #[test]
    fn test_throttle_allows_one_burst() {
        let throttle = ScanThrottle::new(KeyRate {
            keys_per_sec: NonZeroU32::MIN,
            burst: NonZeroU32::new(5).unwrap(),
        });

        for _ in 0..5 {
            assert!(throttle.try_acquire(), "should acquire within burst");
        }
        assert!(!throttle.try_acquire(), "should fail after burst exhausted");
    }

    #[tokio::test]
    async fn test_throttle_refills() {
        let throttle = ScanThrottle::new(KeyRate {
            keys_per_sec: NonZeroU32::new(1000).unwrap(),
            burst: NonZeroU32::MIN,
        });

        throttle.acquire().await;
        let start = std::time::Instant::now();
        throttle.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}

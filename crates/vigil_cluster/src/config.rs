//! Cluster sync configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_detection::{ConfigError, ConfigResult};

/// Settings of [`ClusterSync`](crate::ClusterSync).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Replicate at all. When off the engine runs local-only.
    pub enabled: bool,
    /// Floor on store key expiry (ms). Must outlive decay from T2 to ε
    /// plus the grace period; each write may extend it for its own level.
    pub ttl_ms: u64,
    /// Distinct keys waiting to be written before the oldest is evicted.
    pub queue_capacity: usize,
    /// Keys written per worker wakeup.
    pub batch_size: usize,
    /// First retry delay (ms), doubled per failure.
    pub retry_base_ms: u64,
    /// Retry delay ceiling (ms).
    pub retry_max_ms: u64,
    /// Failed writes before a key is abandoned.
    pub max_attempts: u32,
    /// Compare-and-set rounds per write attempt.
    pub cas_retries: u32,
    /// Fetch deadline (ms). Past it the caller proceeds local-only.
    pub fetch_timeout_ms: u64,
    /// Fetch requests that may wait for the fetch thread.
    pub fetch_queue: usize,
    /// Worker poll interval while idle (ms).
    pub idle_wait_ms: u64,
    /// Time the worker spends writing what is left at shutdown (ms).
    pub shutdown_flush_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // Outlives the slowest built-in check (T2 = 15 at τ = 30 s) decaying
            // to 0.05 plus the grace period
            ttl_ms: 300_000,
            queue_capacity: 4_096,
            batch_size: 64,
            retry_base_ms: 100,
            retry_max_ms: 5_000,
            max_attempts: 10,
            cas_retries: 3,
            fetch_timeout_ms: 50,
            fetch_queue: 256,
            idle_wait_ms: 50,
            shutdown_flush_ms: 1_000,
        }
    }
}

impl SyncConfig {
    /// Store key expiry.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Fetch deadline.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Upper bound on the final drain at shutdown.
    #[must_use]
    pub const fn shutdown_flush(&self) -> Duration {
        Duration::from_millis(self.shutdown_flush_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self.retry_base_ms.saturating_mul(1 << shift).min(self.retry_max_ms);
        Duration::from_millis(ms)
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: format!("sync.{field}"),
            reason: reason.to_owned(),
        };
        if self.ttl_ms == 0 {
            return Err(invalid("ttl_ms", "must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be positive"));
        }
        if self.retry_max_ms < self.retry_base_ms {
            return Err(invalid("retry_max_ms", "must be at least retry_base_ms"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms", "must be positive"));
        }
        if self.fetch_queue == 0 {
            return Err(invalid("fetch_queue", "must be positive"));
        }
        if self.idle_wait_ms == 0 {
            return Err(invalid("idle_wait_ms", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = SyncConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(30), Duration::from_millis(5_000));
    }

    #[test]
    fn test_validate() {
        assert!(SyncConfig::default().validate().is_ok());
        let bad = SyncConfig { fetch_timeout_ms: 0, ..SyncConfig::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { field, .. }) if field == "sync.fetch_timeout_ms"));
    }
}

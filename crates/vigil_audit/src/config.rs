//! Audit log configuration.

use crate::error::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings of [`AuditLog`](crate::AuditLog).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write an audit log at all.
    pub enabled: bool,
    /// Log file.
    pub path: PathBuf,
    /// Records buffered before appends are dropped.
    pub buffer_capacity: usize,
    /// Records written per batch.
    pub batch_size: usize,
    /// Longest a record waits in the buffer (ms).
    pub flush_interval_ms: u64,
    /// fsync after every batch.
    pub sync_data: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("vigil-audit.log"),
            buffer_capacity: 4_096,
            batch_size: 256,
            flush_interval_ms: 200,
            sync_data: true,
        }
    }
}

impl AuditConfig {
    /// Config for `path` with the other settings at their defaults.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Buffer wait bound.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> AuditResult<()> {
        let invalid = |field, reason| Err(AuditError::InvalidConfig { field, reason });
        if self.buffer_capacity == 0 {
            return invalid("audit.buffer_capacity", "must be positive");
        }
        if self.batch_size == 0 {
            return invalid("audit.batch_size", "must be positive");
        }
        if self.flush_interval_ms == 0 {
            return invalid("audit.flush_interval_ms", "must be positive");
        }
        if self.path.as_os_str().is_empty() {
            return invalid("audit.path", "must not be empty");
        }
        Ok(())
    }
}

//! # Detection Error Types
//!
//! Malformed input, failing checks and bad configuration. Insufficient data
//! is not an error: checks answer it with a zero score.

use thiserror::Error;
use vigil_shared::{CheckId, EventKind, PlayerId, Timestamp};

/// Reasons a raw sample is rejected before it becomes an event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    /// Byte buffer does not hold exactly one sample.
    #[error("bad sample length: got {len} bytes, expected {expected}")]
    BadLength {
        /// Bytes received.
        len: usize,
        /// Bytes per sample.
        expected: usize,
    },

    /// Kind code outside the known set.
    #[error("unknown event kind code {0}")]
    UnknownKind(u32),

    /// NaN or infinite payload value.
    #[error("non-finite value in {kind:?} sample")]
    NonFinite {
        /// Sample kind.
        kind: EventKind,
    },

    /// Payload value outside plausibility bounds.
    #[error("implausible {field} in {kind:?} sample: {value} exceeds {limit}")]
    Implausible {
        /// Sample kind.
        kind: EventKind,
        /// Offending field.
        field: &'static str,
        /// Observed value.
        value: f64,
        /// Configured bound.
        limit: f64,
    },

    /// Timestamp earlier than the player's previous sample.
    #[error("timestamp regression for player {player}: {got} < {last}")]
    TimestampRegression {
        /// Player.
        player: PlayerId,
        /// Previous accepted timestamp.
        last: Timestamp,
        /// Rejected timestamp.
        got: Timestamp,
    },
}

/// A check faulted while scoring one event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// Session handed the check a state it did not create.
    #[error("check {check} received foreign state")]
    StateMismatch {
        /// Check id.
        check: CheckId,
    },

    /// Check-specific failure.
    #[error("check {check} failed: {reason}")]
    Failed {
        /// Check id.
        check: CheckId,
        /// Description.
        reason: String,
    },
}

/// Invalid or unreadable configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read config {path}: {reason}")]
    Io {
        /// Path.
        path: String,
        /// OS error text.
        reason: String,
    },

    /// TOML did not parse.
    #[error("config parse error: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: String,
        /// What is wrong.
        reason: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

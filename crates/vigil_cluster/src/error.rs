//! # Cluster Error Types

use thiserror::Error;

/// Failures talking to the shared store.
///
/// None of these reach the event path: publishes are retried in the
/// background and fetches fail open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store did not answer in time.
    #[error("cluster store timed out")]
    Timeout,

    /// Store refused or dropped the connection.
    #[error("cluster store unavailable: {0}")]
    Unavailable(String),

    /// Compare-and-set kept losing to concurrent writers.
    #[error("compare-and-set conflict on {key} after {attempts} attempts")]
    Conflict {
        /// Store key.
        key: String,
        /// CAS attempts made.
        attempts: u32,
    },

    /// Stored value is not a cluster entry.
    #[error("corrupt cluster entry at {key}: {reason}")]
    Corrupt {
        /// Store key.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures starting the synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration out of range.
    #[error(transparent)]
    Config(#[from] vigil_detection::ConfigError),

    /// Worker thread could not be spawned.
    #[error("cannot spawn {thread} thread: {source}")]
    Spawn {
        /// Thread name.
        thread: &'static str,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
}

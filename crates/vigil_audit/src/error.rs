//! # Audit Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Audit log failures.
#[derive(Error, Debug)]
pub enum AuditError {
    /// File could not be opened, written or read.
    #[error("audit log {path}: {source}")]
    Io {
        /// Log path.
        path: PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// File does not start with the audit magic.
    #[error("not an audit log: {0}")]
    BadMagic(PathBuf),

    /// Written by an incompatible version.
    #[error("unsupported audit log version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the file.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },

    /// A complete record failed its checksum or did not decode.
    #[error("corrupt audit record at offset {offset}: {reason}")]
    Corrupt {
        /// Byte offset of the record frame.
        offset: u64,
        /// What failed.
        reason: String,
    },

    /// Record could not be encoded.
    #[error("cannot encode audit record: {0}")]
    Encode(String),

    /// A setting is out of range.
    #[error("invalid audit config {field}: {reason}")]
    InvalidConfig {
        /// Field name.
        field: &'static str,
        /// What is wrong.
        reason: &'static str,
    },

    /// Writer thread could not be spawned.
    #[error("cannot spawn audit writer: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

pub(crate) fn io_error(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> AuditError + '_ {
    move |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    }
}

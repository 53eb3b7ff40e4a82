//! # Engine Error Types
//!
//! Only construction and configuration can fail. Once built, the engine
//! downgrades every runtime fault to a log line and a safe default.

use thiserror::Error;
use vigil_audit::AuditError;
use vigil_cluster::SyncError;
use vigil_detection::ConfigError;
use vigil_shared::CheckId;

/// Engine construction and reload failures.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration unreadable or out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cluster synchronizer could not start.
    #[error("cluster sync: {0}")]
    Sync(#[from] SyncError),

    /// Audit log could not be opened.
    #[error("audit log: {0}")]
    Audit(#[from] AuditError),

    /// Two registered checks share an id.
    #[error("check {0} registered twice")]
    DuplicateCheck(CheckId),

    /// A check subscribes to nothing.
    #[error("check {0} subscribes to no event kind")]
    NoSubscriptions(CheckId),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

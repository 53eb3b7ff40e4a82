//! # Vigil Audit
//!
//! Append-only record of every flag and verdict the engine issues, kept for
//! offline review and appeals. The engine never reads it back.
//!
//! ## Usage
//!
//! ```no_run
//! use vigil_audit::{AuditConfig, AuditLog, AuditReader, AuditSummary};
//!
//! let log = AuditLog::open(&AuditConfig::at("verdicts.log"))?;
//! // hand `log` to the engine as a VerdictSink ...
//! drop(log);
//!
//! let summary = AuditSummary::collect(AuditReader::open("verdicts.log")?);
//! println!("{} records", summary.records);
//! # Ok::<(), vigil_audit::AuditError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod log;
pub mod reader;
pub mod record;
pub mod summary;

pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
pub use log::{AuditLog, AuditStats};
pub use reader::AuditReader;
pub use record::{AuditKind, AuditRecord, AUDIT_MAGIC, AUDIT_VERSION};
pub use summary::{AuditSummary, CheckSummary, PlayerSummary};

//! # Vigil Detection
//!
//! Per-player half of the detection engine.
//!
//! ```text
//!   RawSample ─► Normalizer ─► Event ─► Check::on_event ─► Score ─► ViolationLedger
//!                                         (CheckState in          (decay, thresholds,
//!                                          PlayerSession)           state machine)
//! ```
//!
//! ## Modules
//!
//! - [`normalizer`]: malformed-input boundary and velocity derivation
//! - [`checks`]: the `Check` trait and the built-in catalogue
//! - [`session`]: per-player check state and the session registry
//! - [`ledger`]: violation levels and the Clean/Warming/Flagged/Suppressed machine
//! - [`replay`]: bounded capture of each player's recent events
//! - [`config`]: configuration snapshots and hot swap

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod checks;
pub mod config;
pub mod error;
pub mod ledger;
pub mod normalizer;
pub mod replay;
pub mod score;
pub mod session;

pub use checks::{default_checks, Check, CheckState};
pub use config::{CheckCommon, CommonOverrides, ConfigHandle, DetectionConfig, ReplayConfig};
pub use error::{CheckError, ConfigError, ConfigResult, NormalizeError};
pub use ledger::{
    LedgerParams, LedgerUpdate, RemoteLevel, SweepReport, Transition, ViolationLedger, ViolationRecord,
    ViolationState,
};
pub use normalizer::{decode, Normalizer};
pub use replay::ReplayBuffer;
pub use score::Score;
pub use session::{PlayerSession, SessionHandle, SessionRegistry};

//! # Vigil Shared
//!
//! Common types used by host adapters, the detection engine and the cluster
//! layer.
//!
//! ## CRITICAL RULE
//!
//! This crate holds plain data only. Anything that owns a lock, a thread or
//! per-player state lives in `vigil_detection` or above.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod ids;
pub mod math;
pub mod protocol;
pub mod verdict;

pub use constants::{NOMINAL_TICK_MS, TICK_RATE};
pub use events::{Action, BlockAction, Event, EventKind, Evidence};
pub use ids::{CheckId, PlayerId, Timestamp};
pub use math::Vec3;
pub use protocol::{RawSample, FLAG_ON_GROUND, RAW_SAMPLE_SIZE};
pub use verdict::{Verdict, VerdictSink};

//! # Vigil Stats
//!
//! Streaming numeric primitives shared by every behavioral check.
//!
//! ## Design
//!
//! ```text
//! sample ──► RollingWindow (fixed ring, Welford add/remove) ──► mean/var/z
//!        ├─► Ema           (exponential mean + variance)
//!        ├─► Cusum         (two-sided drift detector)
//!        └─► GcdTracker    (rotation quantisation consistency)
//! ```
//!
//! Every accumulator is O(1) per sample. Nothing in here panics on an empty
//! window or a zero variance: the neutral answer is `0.0`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cusum;
pub mod describe;
pub mod distribution;
pub mod ema;
pub mod gcd;
pub mod online;
pub mod window;

pub use cusum::{Cusum, Shift};
pub use describe::{
    clamp01, coefficient_of_variation, gcd_degrees, mad, median, percentile, zscore,
    MIN_STD_DEV,
};
pub use distribution::{confidence_from_z, erf, LogNormalFit, NormalFit};
pub use ema::Ema;
pub use gcd::GcdTracker;
pub use online::OnlineStats;
pub use window::{RollingWindow, Summary};

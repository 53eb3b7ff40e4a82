//! # Game Clock Constants
//!
//! Defaults shared by the normalizer and the timing checks. Anything a server
//! operator may want to tune is also exposed through configuration; these are
//! only the fallbacks.

/// Host tick rate (updates per second).
pub const TICK_RATE: u32 = 20;

/// Nominal interval between two movement samples, in milliseconds.
///
/// At 20Hz each tick is 50ms.
pub const NOMINAL_TICK_MS: u64 = 1000 / TICK_RATE as u64;

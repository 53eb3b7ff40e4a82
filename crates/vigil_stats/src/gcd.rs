//! Rotation quantisation tracker.
//!
//! Mouse input reaches the server as multiples of a sensitivity-dependent
//! step. The GCD of two consecutive rotation deltas is therefore some small
//! multiple of that step and jumps around from pair to pair. Synthetic
//! rotations (aim assist, smoothing) tend to share one divisor for long
//! runs. The tracker measures how often consecutive pair-GCDs agree.

use crate::describe::gcd_degrees;
use crate::window::RollingWindow;

/// Deltas below this (degrees) carry no quantisation information.
const MIN_DELTA: f64 = 0.01;

/// Incremental GCD consistency over a rolling window.
#[derive(Clone, Debug)]
pub struct GcdTracker {
    previous_delta: Option<f64>,
    previous_gcd: Option<f64>,
    tolerance: f64,
    hits: RollingWindow,
}

impl GcdTracker {
    /// Creates a tracker over the last `window` pair comparisons.
    ///
    /// Two pair-GCDs within `tolerance` degrees count as the same divisor.
    #[must_use]
    pub fn new(window: usize, tolerance: f64) -> Self {
        Self {
            previous_delta: None,
            previous_gcd: None,
            tolerance: tolerance.abs(),
            hits: RollingWindow::new(window),
        }
    }

    /// Feeds one rotation delta and returns the current consistency.
    ///
    /// Tiny deltas are skipped.
    pub fn push(&mut self, delta: f64) -> f64 {
        let delta = delta.abs();
        if !delta.is_finite() || delta < MIN_DELTA {
            return self.consistency();
        }

        if let Some(prev) = self.previous_delta {
            let gcd = gcd_degrees(prev, delta);
            if let Some(last) = self.previous_gcd {
                let same = gcd > 0.0 && (gcd - last).abs() <= self.tolerance;
                self.hits.push(if same { 1.0 } else { 0.0 });
            }
            self.previous_gcd = Some(gcd);
        }
        self.previous_delta = Some(delta);
        self.consistency()
    }

    /// Fraction of recent pair-GCDs that matched their predecessor.
    #[must_use]
    pub fn consistency(&self) -> f64 {
        self.hits.mean()
    }

    /// Number of comparisons in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// True before the first comparison.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Most recent pair-GCD.
    #[must_use]
    pub const fn last_gcd(&self) -> Option<f64> {
        self.previous_gcd
    }
}

//! # CUSUM Change Detector
//!
//! Two-sided cumulative sum over standardized samples:
//!
//! ```text
//! upper = max(0, upper + z - k)     sustained increase
//! lower = max(0, lower - z - k)     sustained decrease
//! alarm when either side >= h
//! ```
//!
//! `k` (reference value, in σ) is the drift tolerated per sample and `h`
//! (decision interval) how much accumulated drift raises an alarm. When the
//! stream returns to baseline each side bleeds off `k` per sample.
//!
//! The classic floor of both sums is `0`. [`Cusum::with_credit`] lowers it
//! so a stretch of opposite drift is banked and offsets a later burst
//! (lag followed by catch-up).

use crate::describe::zscore;
use crate::online::OnlineStats;

/// Direction of a detected shift.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shift {
    /// Mean moved up.
    Increase,
    /// Mean moved down.
    Decrease,
}

/// Two-sided CUSUM.
#[derive(Clone, Debug)]
pub struct Cusum {
    k: f64,
    h: f64,
    floor: f64,
    upper: f64,
    lower: f64,
    baseline: OnlineStats,
    alarms: u64,
}

impl Cusum {
    /// Creates a detector with reference value `k` and decision interval `h`.
    #[must_use]
    pub fn new(k: f64, h: f64) -> Self {
        Self {
            k: k.max(0.0),
            h: h.max(f64::EPSILON),
            floor: 0.0,
            upper: 0.0,
            lower: 0.0,
            baseline: OnlineStats::new(),
            alarms: 0,
        }
    }

    /// Lets both sums go down to `-credit`.
    #[must_use]
    pub fn with_credit(mut self, credit: f64) -> Self {
        self.floor = -credit.abs();
        self
    }

    /// Self-estimated mode: standardizes against the samples seen so far,
    /// then folds `value` into that baseline.
    ///
    /// The sample is scored before it joins the baseline so a large shift
    /// cannot dampen its own z-score. Until the baseline has two samples
    /// and a spread, the standardized value is `0`.
    pub fn push(&mut self, value: f64) -> Option<Shift> {
        let z = self.baseline.zscore(value);
        self.baseline.push(value);
        self.push_standardized(z)
    }

    /// Known-parameter mode: standardizes against a fixed mean and σ.
    pub fn push_known(&mut self, value: f64, mean: f64, std_dev: f64) -> Option<Shift> {
        self.push_standardized(zscore(value, mean, std_dev))
    }

    /// Feeds an already standardized value.
    pub fn push_standardized(&mut self, z: f64) -> Option<Shift> {
        let z = if z.is_finite() { z } else { 0.0 };
        self.upper = (self.upper + z - self.k).max(self.floor);
        self.lower = (self.lower - z - self.k).max(self.floor);

        let shift = if self.upper >= self.h {
            Some(Shift::Increase)
        } else if self.lower >= self.h {
            Some(Shift::Decrease)
        } else {
            None
        };
        if shift.is_some() {
            self.alarms += 1;
        }
        shift
    }

    /// Accumulated upward drift.
    #[must_use]
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Accumulated downward drift.
    #[must_use]
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Decision interval.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.h
    }

    /// Number of samples that were in alarm.
    #[must_use]
    pub const fn alarms(&self) -> u64 {
        self.alarms
    }

    /// Baseline used by the self-estimated mode.
    #[must_use]
    pub const fn baseline(&self) -> &OnlineStats {
        &self.baseline
    }

    /// Clears both sums after an alarm, keeping the baseline.
    pub fn rearm(&mut self) {
        self.upper = 0.0;
        self.lower = 0.0;
    }

    /// Clears both sums and the baseline.
    pub fn reset(&mut self) {
        self.upper = 0.0;
        self.lower = 0.0;
        self.baseline.reset();
        self.alarms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_stream_never_alarms() {
        let mut cusum = Cusum::new(0.5, 5.0);
        for i in 0..500 {
            let value = 50.0 + if i % 2 == 0 { 1.0 } else { -1.0 };
            assert_eq!(cusum.push_known(value, 50.0, 1.0), None);
        }
        assert_eq!(cusum.alarms(), 0);
    }

    #[test]
    fn test_sustained_decrease_alarms() {
        let mut cusum = Cusum::new(0.5, 5.0);
        let mut fired = None;
        for i in 0..20 {
            if let Some(shift) = cusum.push_known(48.0, 50.0, 1.0) {
                fired = Some((i, shift));
                break;
            }
        }
        // Each sample adds 2.0 - 0.5 = 1.5 to the lower sum.
        assert_eq!(fired, Some((3, Shift::Decrease)));
    }

    #[test]
    fn test_sum_bleeds_off_after_recovery() {
        let mut cusum = Cusum::new(0.5, 5.0);
        for _ in 0..3 {
            cusum.push_known(48.0, 50.0, 1.0);
        }
        let peak = cusum.lower();
        for _ in 0..3 {
            cusum.push_known(50.0, 50.0, 1.0);
        }
        assert!((cusum.lower() - (peak - 1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_self_estimated_detects_jump() {
        let mut cusum = Cusum::new(0.5, 4.0);
        for i in 0..100 {
            let value = 10.0 + if i % 2 == 0 { 0.5 } else { -0.5 };
            assert_eq!(cusum.push(value), None);
        }
        let mut alarmed = false;
        for _ in 0..10 {
            alarmed |= cusum.push(13.0) == Some(Shift::Increase);
        }
        assert!(alarmed);
    }

    #[test]
    fn test_credit_offsets_later_burst() {
        // Lag (one 300 ms gap) then catch-up (five back-to-back samples).
        let mut cusum = Cusum::new(0.0, 5.0).with_credit(20.0);
        assert_eq!(cusum.push_known(300.0, 50.0, 50.0), None);
        assert!((cusum.lower() + 5.0).abs() < 1e-12);
        for _ in 0..5 {
            assert_eq!(cusum.push_known(0.0, 50.0, 50.0), None);
        }
        assert!(cusum.lower().abs() < 1e-12);

        // Without banked credit the same burst alarms.
        let mut plain = Cusum::new(0.0, 5.0);
        let alarms = (0..5).filter(|_| plain.push_known(0.0, 50.0, 50.0).is_some()).count();
        assert_eq!(alarms, 1);
    }

    #[test]
    fn test_degenerate_baseline_is_neutral() {
        let mut cusum = Cusum::new(0.5, 4.0);
        assert_eq!(cusum.push_known(100.0, 0.0, 0.0), None);
        assert_eq!(cusum.upper(), 0.0);
    }
}

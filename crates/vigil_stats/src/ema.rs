//! Exponential moving average with exponentially weighted variance.

use crate::describe::zscore;

/// Exponentially weighted mean and variance.
///
/// `alpha` is the weight of the newest sample. The variance recurrence is
/// the incremental form from Finch, "Incremental calculation of weighted
/// mean and variance":
///
/// ```text
/// diff  = x - mean
/// mean += alpha * diff
/// var   = (1 - alpha) * (var + alpha * diff^2)
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ema {
    alpha: f64,
    mean: f64,
    variance: f64,
    count: u64,
}

impl Ema {
    /// Creates a new EMA. `alpha` is clamped into `(0, 1]`; NaN becomes `1`.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_nan() { 1.0 } else { alpha.clamp(f64::EPSILON, 1.0) };
        Self {
            alpha,
            mean: 0.0,
            variance: 0.0,
            count: 0,
        }
    }

    /// EMA whose sample weight halves every `samples` pushes.
    #[must_use]
    pub fn with_half_life(samples: f64) -> Self {
        if samples.is_nan() || samples <= 0.0 {
            return Self::new(1.0);
        }
        Self::new(1.0 - 0.5_f64.powf(1.0 / samples))
    }

    /// Adds a sample and returns the updated mean.
    ///
    /// The first sample seeds the mean directly.
    pub fn push(&mut self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.mean;
        }
        if self.count == 0 {
            self.mean = value;
            self.variance = 0.0;
        } else {
            let diff = value - self.mean;
            let incr = self.alpha * diff;
            self.mean += incr;
            self.variance = (1.0 - self.alpha) * (self.variance + diff * incr);
        }
        self.count += 1;
        self.mean
    }

    /// Smoothing factor.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Current mean, `None` before the first sample.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Exponentially weighted variance.
    #[must_use]
    pub const fn variance(&self) -> f64 {
        self.variance
    }

    /// Exponentially weighted standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Samples pushed.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Samples after which a sample's weight has halved.
    #[must_use]
    pub fn half_life(&self) -> f64 {
        if self.alpha >= 1.0 {
            return 0.0;
        }
        (0.5_f64).ln() / (1.0 - self.alpha).ln()
    }

    /// Equivalent number of equally weighted samples, `(2 - α) / α`.
    #[must_use]
    pub fn effective_sample_size(&self) -> f64 {
        (2.0 - self.alpha) / self.alpha
    }

    /// z-score of `value` against the weighted moments.
    #[must_use]
    pub fn zscore(&self, value: f64) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        zscore(value, self.mean, self.std_dev())
    }

    /// True if `|zscore(value)| >= threshold`.
    #[must_use]
    pub fn is_outlier(&self, value: f64, threshold: f64) -> bool {
        let z = self.zscore(value);
        z != 0.0 && z.abs() >= threshold
    }

    /// Forgets every sample, keeping `alpha`.
    pub fn reset(&mut self) {
        *self = Self::new(self.alpha);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds_mean() {
        let mut ema = Ema::new(0.1);
        assert_eq!(ema.mean(), None);
        assert_eq!(ema.push(50.0), 50.0);
        assert_eq!(ema.variance(), 0.0);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut ema = Ema::new(0.2);
        ema.push(0.0);
        for _ in 0..200 {
            ema.push(10.0);
        }
        assert!((ema.mean().unwrap_or_default() - 10.0).abs() < 1e-9);
        assert!(ema.variance() < 1e-9);
    }

    #[test]
    fn test_half_life_roundtrip() {
        let ema = Ema::with_half_life(10.0);
        assert!((ema.half_life() - 10.0).abs() < 1e-9);
        assert!(ema.effective_sample_size() > 10.0);
    }

    #[test]
    fn test_alpha_clamped() {
        assert_eq!(Ema::new(5.0).alpha(), 1.0);
        assert_eq!(Ema::new(f64::NAN).alpha(), 1.0);
        assert!(Ema::new(-1.0).alpha() > 0.0);
    }

    #[test]
    fn test_outlier_after_stable_noise() {
        let mut ema = Ema::new(0.1);
        for i in 0..100 {
            ema.push(if i % 2 == 0 { 9.0 } else { 11.0 });
        }
        assert!(ema.is_outlier(30.0, 4.0));
        assert!(!ema.is_outlier(10.5, 4.0));
    }
}

//! # Distribution Fitting
//!
//! Maximum-likelihood fits of the two shapes the checks care about:
//!
//! - **Normal**: click intervals, movement speed around a cap.
//! - **Log-normal**: strictly positive, right-skewed quantities such as
//!   reach excess or rotation magnitude.
//!
//! Plus [`confidence_from_z`], the one place a z-score becomes a
//! confidence in `[0, 1]`.

use crate::describe::{clamp01, zscore, MIN_STD_DEV};
use crate::online::OnlineStats;
use crate::window::RollingWindow;

/// Error function, Abramowitz & Stegun 7.1.26 (|ε| < 1.5e-7).
#[must_use]
pub fn erf(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A: [f64; 5] = [
        0.254_829_592,
        -0.284_496_736,
        1.421_413_741,
        -1.453_152_027,
        1.061_405_429,
    ];

    if x.is_nan() {
        return 0.0;
    }
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = A.iter().rev().fold(0.0, |acc, a| acc * t + a) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

fn standard_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Normal distribution fitted by maximum likelihood.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalFit {
    /// Mean.
    pub mean: f64,
    /// Standard deviation (MLE, population).
    pub std_dev: f64,
}

impl NormalFit {
    /// Fits finite values. `None` with fewer than two.
    #[must_use]
    pub fn fit(values: &[f64]) -> Option<Self> {
        let mut stats = OnlineStats::new();
        values.iter().for_each(|&v| stats.push(v));
        Self::from_stats(&stats)
    }

    /// Fits the contents of a rolling window.
    #[must_use]
    pub fn from_window(window: &RollingWindow) -> Option<Self> {
        (window.len() >= 2).then(|| Self {
            mean: window.mean(),
            std_dev: window.std_dev(),
        })
    }

    /// Fits from an accumulator.
    #[must_use]
    pub fn from_stats(stats: &OnlineStats) -> Option<Self> {
        (stats.count() >= 2).then(|| Self {
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        })
    }

    /// True if σ is too small for probabilities to mean anything.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.std_dev <= MIN_STD_DEV
    }

    /// z-score of `x`.
    #[must_use]
    pub fn zscore(&self, x: f64) -> f64 {
        zscore(x, self.mean, self.std_dev)
    }

    /// P(X <= x). A degenerate fit is a step at the mean.
    #[must_use]
    pub fn cdf(&self, x: f64) -> f64 {
        if self.is_degenerate() {
            return if x < self.mean { 0.0 } else { 1.0 };
        }
        standard_cdf((x - self.mean) / self.std_dev)
    }

    /// P(X > x).
    #[must_use]
    pub fn upper_tail(&self, x: f64) -> f64 {
        1.0 - self.cdf(x)
    }

    /// P(|X - μ| >= |x - μ|). `1.0` for a degenerate fit.
    #[must_use]
    pub fn two_sided_p(&self, x: f64) -> f64 {
        if self.is_degenerate() {
            return 1.0;
        }
        let z = self.zscore(x).abs();
        2.0 * (1.0 - standard_cdf(z))
    }
}

/// Log-normal distribution fitted by maximum likelihood on `ln x`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogNormalFit {
    /// Mean of `ln X`.
    pub mu: f64,
    /// Standard deviation of `ln X`.
    pub sigma: f64,
}

impl LogNormalFit {
    /// Fits strictly positive finite values; others are ignored.
    /// `None` with fewer than two usable values.
    #[must_use]
    pub fn fit(values: &[f64]) -> Option<Self> {
        let mut stats = OnlineStats::new();
        values
            .iter()
            .filter(|v| v.is_finite() && **v > 0.0)
            .for_each(|v| stats.push(v.ln()));
        (stats.count() >= 2).then(|| Self {
            mu: stats.mean(),
            sigma: stats.std_dev(),
        })
    }

    /// Median, `e^μ`.
    #[must_use]
    pub fn median(&self) -> f64 {
        self.mu.exp()
    }

    /// Mean, `e^(μ + σ²/2)`.
    #[must_use]
    pub fn mean(&self) -> f64 {
        (self.mu + self.sigma * self.sigma / 2.0).exp()
    }

    /// P(X <= x).
    #[must_use]
    pub fn cdf(&self, x: f64) -> f64 {
        if x.is_nan() || x <= 0.0 {
            return 0.0;
        }
        NormalFit {
            mean: self.mu,
            std_dev: self.sigma,
        }
        .cdf(x.ln())
    }

    /// P(X > x).
    #[must_use]
    pub fn upper_tail(&self, x: f64) -> f64 {
        1.0 - self.cdf(x)
    }
}

/// Maps a z-score onto a confidence.
///
/// `0` below `threshold`, rising linearly to `1` at `saturation`. A
/// saturation at or below the threshold makes it a step.
#[must_use]
pub fn confidence_from_z(z: f64, threshold: f64, saturation: f64) -> f64 {
    if z.is_nan() || z < threshold {
        return 0.0;
    }
    if saturation <= threshold {
        return 1.0;
    }
    clamp01((z - threshold) / (saturation - threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erf_known_values() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
        assert!((erf(3.0) - 0.999_977_91).abs() < 1e-6);
    }

    #[test]
    fn test_normal_fit_probabilities() {
        let fit = NormalFit { mean: 10.0, std_dev: 2.0 };
        assert!((fit.cdf(10.0) - 0.5).abs() < 1e-7);
        assert!((fit.two_sided_p(14.0) - 0.0455).abs() < 1e-3);
        assert!((fit.upper_tail(12.0) - 0.1587).abs() < 1e-3);
    }

    #[test]
    fn test_fit_requires_two_values() {
        assert!(NormalFit::fit(&[1.0]).is_none());
        let fit = NormalFit::fit(&[1.0, 3.0]);
        assert_eq!(fit, Some(NormalFit { mean: 2.0, std_dev: 1.0 }));
    }

    #[test]
    fn test_degenerate_fit_is_step() {
        let fit = NormalFit { mean: 5.0, std_dev: 0.0 };
        assert_eq!(fit.cdf(4.9), 0.0);
        assert_eq!(fit.cdf(5.0), 1.0);
        assert_eq!(fit.two_sided_p(100.0), 1.0);
    }

    #[test]
    fn test_lognormal_fit() {
        let values = [1.0, std::f64::consts::E, std::f64::consts::E.powi(2)];
        let fit = LogNormalFit::fit(&values).unwrap_or(LogNormalFit { mu: 0.0, sigma: 0.0 });
        assert!((fit.mu - 1.0).abs() < 1e-12);
        assert!((fit.median() - std::f64::consts::E).abs() < 1e-9);
        assert!((fit.cdf(fit.median()) - 0.5).abs() < 1e-7);
        assert_eq!(fit.cdf(-1.0), 0.0);
        assert!(LogNormalFit::fit(&[-1.0, 0.0, 2.0]).is_none());
    }

    #[test]
    fn test_confidence_ramp() {
        assert_eq!(confidence_from_z(2.0, 3.0, 6.0), 0.0);
        assert_eq!(confidence_from_z(3.0, 3.0, 6.0), 0.0);
        assert!((confidence_from_z(4.5, 3.0, 6.0) - 0.5).abs() < 1e-12);
        assert_eq!(confidence_from_z(60.0, 3.0, 6.0), 1.0);
        assert_eq!(confidence_from_z(3.0, 3.0, 3.0), 1.0);
        assert_eq!(confidence_from_z(f64::NAN, 3.0, 6.0), 0.0);
    }
}

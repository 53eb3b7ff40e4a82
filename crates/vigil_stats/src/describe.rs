//! Descriptive helpers over plain slices and scalars.
//!
//! These are the allocation-tolerant counterparts of the streaming
//! accumulators: checks use them on bounded windows (never on unbounded
//! history).

/// Standard deviations below this are treated as zero.
pub const MIN_STD_DEV: f64 = 1e-9;

/// Resolution of [`gcd_degrees`], in degrees.
const GCD_RESOLUTION: f64 = 1000.0;

/// z-score of `value`; `0.0` when the spread is degenerate.
#[must_use]
pub fn zscore(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev.is_nan() || std_dev <= MIN_STD_DEV || !value.is_finite() || !mean.is_finite() {
        return 0.0;
    }
    (value - mean) / std_dev
}

/// σ / μ; `0.0` when the mean is (near) zero.
#[must_use]
pub fn coefficient_of_variation(mean: f64, std_dev: f64) -> f64 {
    if mean.abs() <= MIN_STD_DEV || !std_dev.is_finite() {
        return 0.0;
    }
    std_dev / mean.abs()
}

/// Clamps into `[0, 1]`, mapping NaN to `0`.
#[must_use]
pub fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    out.sort_by(f64::total_cmp);
    out
}

fn median_sorted(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Median; `0.0` for an empty slice. Non-finite values are ignored.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    median_sorted(&sorted(values))
}

/// Median absolute deviation, scaled by 1.4826 so it estimates σ for
/// normally distributed data.
#[must_use]
pub fn mad(values: &[f64]) -> f64 {
    let data = sorted(values);
    if data.is_empty() {
        return 0.0;
    }
    let center = median_sorted(&data);
    let deviations: Vec<f64> = data.iter().map(|v| (v - center).abs()).collect();
    median(&deviations) * 1.4826
}

/// Linear-interpolated percentile, `p` in `[0, 100]`.
#[must_use]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let data = sorted(values);
    if data.is_empty() {
        return 0.0;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (data.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return data[low];
    }
    let frac = rank - low as f64;
    data[low] + (data[high] - data[low]) * frac
}

/// Greatest common divisor of two angles, at 0.001° resolution.
///
/// Returns `0.0` if either angle rounds to zero.
#[must_use]
pub fn gcd_degrees(a: f64, b: f64) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    let mut x = (a.abs() * GCD_RESOLUTION).round() as u64;
    let mut y = (b.abs() * GCD_RESOLUTION).round() as u64;
    if x == 0 || y == 0 {
        return 0.0;
    }
    while y != 0 {
        let t = x % y;
        x = y;
        y = t;
    }
    x as f64 / GCD_RESOLUTION
}

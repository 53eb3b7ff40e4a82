//! # Rolling Window
//!
//! Fixed-capacity ring buffer that keeps mean and variance current with
//! Welford's update on insert and its inverse on eviction.
//!
//! ```text
//!   capacity = 4
//!   ┌─────┬─────┬─────┬─────┐
//!   │ 3.0 │ 4.0 │ 1.0 │ 2.0 │   head ──► slot 2 (oldest, next to evict)
//!   └─────┴─────┴─────┴─────┘
//! ```
//!
//! Removing samples from a Welford accumulator slowly accumulates rounding
//! error, so after every `capacity` evictions the moments are recomputed
//! from the buffer (amortised O(1)).

use crate::describe::{zscore, MIN_STD_DEV};

/// Snapshot of a window after a push.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    /// Samples currently buffered.
    pub count: usize,
    /// Mean of the buffered samples.
    pub mean: f64,
    /// Population variance of the buffered samples.
    pub variance: f64,
}

impl Summary {
    /// Population standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Fixed-capacity rolling window of `f64` samples.
#[derive(Clone, Debug)]
pub struct RollingWindow {
    buf: Vec<f64>,
    capacity: usize,
    /// Index of the oldest sample once full, next write slot otherwise.
    head: usize,
    /// Samples folded into `mean`/`m2`.
    n: usize,
    mean: f64,
    m2: f64,
    evictions: usize,
}

impl RollingWindow {
    /// Creates a new window. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
            n: 0,
            mean: 0.0,
            m2: 0.0,
            evictions: 0,
        }
    }

    /// Pushes a sample, evicting the oldest when full.
    ///
    /// Non-finite samples are ignored.
    pub fn push(&mut self, value: f64) -> Summary {
        if !value.is_finite() {
            return self.summary();
        }

        if self.buf.len() < self.capacity {
            self.buf.push(value);
            self.add(value);
            return self.summary();
        }

        let evicted = std::mem::replace(&mut self.buf[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        self.remove(evicted);
        self.add(value);

        self.evictions += 1;
        if self.evictions >= self.capacity {
            self.resync();
        }
        self.summary()
    }

    fn add(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn remove(&mut self, value: f64) {
        if self.n <= 1 {
            self.n = 0;
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let n = self.n as f64;
        let old_mean = self.mean;
        self.mean = (n * old_mean - value) / (n - 1.0);
        self.m2 = (self.m2 - (value - old_mean) * (value - self.mean)).max(0.0);
        self.n -= 1;
    }

    fn resync(&mut self) {
        self.evictions = 0;
        self.n = self.buf.len();
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (i, &x) in self.buf.iter().enumerate() {
            let delta = x - mean;
            mean += delta / (i + 1) as f64;
            m2 += delta * (x - mean);
        }
        self.mean = mean;
        self.m2 = m2;
    }

    /// Current summary.
    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary {
            count: self.buf.len(),
            mean: self.mean(),
            variance: self.variance(),
        }
    }

    /// Number of buffered samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if no samples are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True once the window holds `capacity` samples.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    /// Maximum number of samples.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean, `0.0` when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.buf.is_empty() {
            0.0
        } else {
            self.mean
        }
    }

    /// Population variance, `0.0` with fewer than two samples.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.buf.len() < 2 {
            0.0
        } else {
            (self.m2 / self.buf.len() as f64).max(0.0)
        }
    }

    /// Sample (n - 1) variance, `0.0` with fewer than two samples.
    #[must_use]
    pub fn sample_variance(&self) -> f64 {
        if self.buf.len() < 2 {
            0.0
        } else {
            (self.m2 / (self.buf.len() - 1) as f64).max(0.0)
        }
    }

    /// Population standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// z-score of `value` against the buffered samples.
    ///
    /// `0.0` with fewer than two samples or a degenerate spread.
    #[must_use]
    pub fn zscore(&self, value: f64) -> f64 {
        if self.buf.len() < 2 {
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

    /// True if the spread is too small to score against.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.std_dev() <= MIN_STD_DEV
    }

    /// Most recent sample.
    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        let idx = if self.is_full() {
            (self.head + self.capacity - 1) % self.capacity
        } else {
            self.buf.len() - 1
        };
        Some(self.buf[idx])
    }

    /// Oldest buffered sample.
    #[must_use]
    pub fn oldest(&self) -> Option<f64> {
        if self.buf.is_empty() {
            None
        } else if self.is_full() {
            Some(self.buf[self.head])
        } else {
            Some(self.buf[0])
        }
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let split = if self.is_full() { self.head } else { 0 };
        self.buf[split..].iter().chain(self.buf[..split].iter()).copied()
    }

    /// Copies the samples, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    /// Drops every sample.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
        self.n = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
        self.evictions = 0;
    }
}

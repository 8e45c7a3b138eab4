//! Running statistics used for z-score based outlier detection.

/// Standard deviations below this are treated as zero spread.
pub const MIN_STD: f64 = 1e-12;

/// Welford accumulator for mean and population standard deviation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the accumulator.
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Number of observations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sample mean (0.0 when empty).
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation (0.0 when empty).
    pub fn std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    /// Z-score of `x` against the accumulated distribution.
    pub fn z_score(&self, x: f64) -> f64 {
        z_score(x, self.mean(), self.std())
    }
}

impl FromIterator<f64> for RunningStats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = RunningStats::new();
        for x in iter {
            stats.push(x);
        }
        stats
    }
}

/// `(x - mean) / std`, or 0.0 when the distribution has no spread.
pub fn z_score(x: f64, mean: f64, std: f64) -> f64 {
    if std < MIN_STD {
        0.0
    } else {
        (x - mean) / std
    }
}

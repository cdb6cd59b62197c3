//! Memory leak detection
//!
//! Flags a sustained upward allocation trend over the most recent readings of
//! one system. Small dips are tolerated as long as every reading stays within
//! a fixed fraction of its predecessor and the window grows overall.
//!
//! This is a heuristic: noisy real leaks can slip through and steadily
//! growing workloads can trip it. Treat a finding as a signal to look, not a
//! diagnosis.

use crate::config::{
    EngineConfig, DEFAULT_LEAK_GROWTH_FACTOR, DEFAULT_LEAK_TOLERANCE, DEFAULT_LEAK_WINDOW,
};

/// Detects sustained allocation growth over a fixed number of readings
#[derive(Debug, Clone, PartialEq)]
pub struct LeakDetector {
    /// Number of most recent readings examined
    pub window: usize,
    /// Each reading must be at least `tolerance * previous`
    pub tolerance: f64,
    /// Newest reading must exceed `growth_factor * oldest`
    pub growth_factor: f64,
}

impl LeakDetector {
    pub fn new(window: usize, tolerance: f64, growth_factor: f64) -> Self {
        Self {
            window,
            tolerance,
            growth_factor,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.leak_window,
            config.leak_tolerance,
            config.leak_growth_factor,
        )
    }

    /// Detect a leak from readings in arrival order
    ///
    /// # Arguments
    /// * `samples` - `(timestamp_secs, allocated_mb)` pairs, oldest first. Only
    ///   the last `window` entries are examined.
    ///
    /// # Returns
    /// * `Some(LeakAnomaly)` if the readings trend upward past the growth factor
    /// * `None` if there are fewer than `window` readings or no trend
    pub fn detect(&self, samples: &[(i64, f64)]) -> Option<LeakAnomaly> {
        if self.window < 2 || samples.len() < self.window {
            return None;
        }

        let recent = &samples[samples.len() - self.window..];

        if !self.is_tolerant_non_decreasing(recent) {
            return None;
        }

        let (_, oldest) = recent[0];
        let (_, newest) = recent[recent.len() - 1];
        if newest <= oldest * self.growth_factor {
            return None;
        }

        let growth_percent = if oldest > 0.0 {
            (newest - oldest) / oldest * 100.0
        } else {
            0.0
        };

        Some(LeakAnomaly {
            oldest_mb: oldest,
            newest_mb: newest,
            growth_percent,
            slope_mb_per_sec: linear_regression_slope(recent),
            monotonicity: calculate_monotonicity(recent),
            samples_analyzed: recent.len(),
        })
    }

    /// Every value is at least `tolerance` of its immediate predecessor
    fn is_tolerant_non_decreasing(&self, samples: &[(i64, f64)]) -> bool {
        samples
            .windows(2)
            .all(|pair| pair[1].1 >= pair[0].1 * self.tolerance)
    }
}

impl Default for LeakDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_LEAK_WINDOW,
            DEFAULT_LEAK_TOLERANCE,
            DEFAULT_LEAK_GROWTH_FACTOR,
        )
    }
}

/// Least-squares slope of MB over seconds, `0.0` when timestamps coincide
fn linear_regression_slope(samples: &[(i64, f64)]) -> f64 {
    let n = samples.len() as f64;
    if n < 2.0 {
        return 0.0;
    }

    // Normalize timestamps to avoid precision issues
    let t0 = samples.first().map(|(ts, _)| *ts).unwrap_or(0) as f64;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (ts, mb) in samples {
        let x = (*ts as f64) - t0;
        sum_x += x;
        sum_y += mb;
        sum_xy += x * mb;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

/// Fraction of steps where the reading did not go down
fn calculate_monotonicity(samples: &[(i64, f64)]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let increasing = samples
        .windows(2)
        .filter(|pair| pair[1].1 >= pair[0].1)
        .count();

    increasing as f64 / (samples.len() - 1) as f64
}

/// Memory leak finding for one system
#[derive(Debug, Clone, PartialEq)]
pub struct LeakAnomaly {
    /// First reading of the examined window
    pub oldest_mb: f64,
    /// Last reading of the examined window
    pub newest_mb: f64,
    /// Growth from oldest to newest, in percent
    pub growth_percent: f64,
    /// Regression slope over the reading timestamps
    pub slope_mb_per_sec: f64,
    /// Fraction of non-decreasing steps, 0.0-1.0
    pub monotonicity: f64,
    /// Number of readings examined
    pub samples_analyzed: usize,
}

impl LeakAnomaly {
    pub fn leak_rate_mb_per_hour(&self) -> f64 {
        self.slope_mb_per_sec * 3600.0
    }
}

//! Memory spike detection
//!
//! Flags the most recent reading when it sits more than `sigma` population
//! standard deviations above the mean of the window it belongs to. Only the
//! high side is reported.

use crate::config::{EngineConfig, DEFAULT_SPIKE_SIGMA, DEFAULT_SPIKE_WINDOW};

/// Minimum readings for a non-degenerate standard deviation
const MIN_SAMPLES_FOR_DETECTION: usize = 2;

/// Detects an abnormal latest reading
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeDetector {
    /// Number of standard deviations to consider a spike
    pub sigma: f64,
    /// Number of most recent readings examined
    pub window: usize,
}

impl SpikeDetector {
    pub fn new(sigma: f64, window: usize) -> Self {
        Self { sigma, window }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.spike_sigma, config.spike_window)
    }

    /// Detect a spike on the newest of `values` (MB, oldest first)
    ///
    /// Statistics cover the last `window` values, including the newest one.
    pub fn detect(&self, values: &[f64]) -> Option<SpikeAnomaly> {
        let start = values.len().saturating_sub(self.window);
        let recent = &values[start..];

        let stats = WindowStats::from_values(recent)?;
        if stats.count < MIN_SAMPLES_FOR_DETECTION {
            return None;
        }

        let current = *recent.last()?;
        let threshold = stats.mean + self.sigma * stats.std_dev;

        if current <= threshold {
            return None;
        }

        let z_score = if stats.std_dev < f64::EPSILON {
            0.0
        } else {
            (current - stats.mean) / stats.std_dev
        };

        Some(SpikeAnomaly {
            current_mb: current,
            mean_mb: stats.mean,
            std_dev_mb: stats.std_dev,
            threshold_mb: threshold,
            z_score,
            samples_analyzed: stats.count,
        })
    }
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SPIKE_SIGMA, DEFAULT_SPIKE_WINDOW)
    }
}

/// Mean and population standard deviation of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl WindowStats {
    /// Two-pass statistics; `None` for an empty slice
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            count,
        })
    }
}

/// Memory spike finding for one system
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeAnomaly {
    /// Latest reading that triggered the spike
    pub current_mb: f64,
    /// Mean of the window
    pub mean_mb: f64,
    /// Population standard deviation of the window
    pub std_dev_mb: f64,
    /// `mean + sigma * std_dev`
    pub threshold_mb: f64,
    /// Standard deviations above the mean
    pub z_score: f64,
    pub samples_analyzed: usize,
}

impl SpikeAnomaly {
    /// Get the percentage above the window mean
    pub fn percentage_above_mean(&self) -> f64 {
        if self.mean_mb < f64::EPSILON {
            return 0.0;
        }
        ((self.current_mb - self.mean_mb) / self.mean_mb) * 100.0
    }
}

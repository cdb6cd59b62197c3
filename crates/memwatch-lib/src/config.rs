//! Engine policy configuration
//!
//! Every threshold the detectors and the classifier share lives here so that
//! call sites never re-derive them.

use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Snapshots retained per system for fleet-wide aggregation
pub const DEFAULT_RETAINED_CAPACITY: usize = 1000;

/// Snapshots used for live per-system trend views
pub const DEFAULT_TREND_CAPACITY: usize = 50;

/// Readings examined by the leak detector
pub const DEFAULT_LEAK_WINDOW: usize = 10;

/// Each reading must be at least this fraction of its predecessor
pub const DEFAULT_LEAK_TOLERANCE: f64 = 0.95;

/// Newest reading must exceed the oldest by this factor
pub const DEFAULT_LEAK_GROWTH_FACTOR: f64 = 1.2;

/// Readings examined by the spike detector
pub const DEFAULT_SPIKE_WINDOW: usize = 10;

/// Standard deviations above the mean that count as a spike
pub const DEFAULT_SPIKE_SIGMA: f64 = 2.0;

/// Ratio at which a system enters the warning bucket
pub const DEFAULT_WARNING_RATIO: f64 = 150.0;

/// Ratio at which a system enters the critical bucket
pub const DEFAULT_CRITICAL_RATIO: f64 = 300.0;

/// Policy constants for the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_retained_capacity")]
    pub retained_capacity: usize,

    #[serde(default = "default_trend_capacity")]
    pub trend_capacity: usize,

    #[serde(default = "default_leak_window")]
    pub leak_window: usize,

    #[serde(default = "default_leak_tolerance")]
    pub leak_tolerance: f64,

    #[serde(default = "default_leak_growth_factor")]
    pub leak_growth_factor: f64,

    #[serde(default = "default_spike_window")]
    pub spike_window: usize,

    #[serde(default = "default_spike_sigma")]
    pub spike_sigma: f64,

    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,

    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,
}

fn default_retained_capacity() -> usize {
    DEFAULT_RETAINED_CAPACITY
}

fn default_trend_capacity() -> usize {
    DEFAULT_TREND_CAPACITY
}

fn default_leak_window() -> usize {
    DEFAULT_LEAK_WINDOW
}

fn default_leak_tolerance() -> f64 {
    DEFAULT_LEAK_TOLERANCE
}

fn default_leak_growth_factor() -> f64 {
    DEFAULT_LEAK_GROWTH_FACTOR
}

fn default_spike_window() -> usize {
    DEFAULT_SPIKE_WINDOW
}

fn default_spike_sigma() -> f64 {
    DEFAULT_SPIKE_SIGMA
}

fn default_warning_ratio() -> f64 {
    DEFAULT_WARNING_RATIO
}

fn default_critical_ratio() -> f64 {
    DEFAULT_CRITICAL_RATIO
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retained_capacity: DEFAULT_RETAINED_CAPACITY,
            trend_capacity: DEFAULT_TREND_CAPACITY,
            leak_window: DEFAULT_LEAK_WINDOW,
            leak_tolerance: DEFAULT_LEAK_TOLERANCE,
            leak_growth_factor: DEFAULT_LEAK_GROWTH_FACTOR,
            spike_window: DEFAULT_SPIKE_WINDOW,
            spike_sigma: DEFAULT_SPIKE_SIGMA,
            warning_ratio: DEFAULT_WARNING_RATIO,
            critical_ratio: DEFAULT_CRITICAL_RATIO,
        }
    }
}

impl EngineConfig {
    /// Check that the policy values are usable together
    pub fn validate(&self) -> Result<()> {
        if self.retained_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "retained_capacity must be at least 1".to_string(),
            ));
        }
        if self.trend_capacity == 0 || self.trend_capacity > self.retained_capacity {
            return Err(EngineError::InvalidConfig(format!(
                "trend_capacity must be in 1..={}, got {}",
                self.retained_capacity, self.trend_capacity
            )));
        }
        if self.leak_window < 2 || self.leak_window > self.retained_capacity {
            return Err(EngineError::InvalidConfig(format!(
                "leak_window must be in 2..={}, got {}",
                self.retained_capacity, self.leak_window
            )));
        }
        if self.spike_window < 2 || self.spike_window > self.retained_capacity {
            return Err(EngineError::InvalidConfig(format!(
                "spike_window must be in 2..={}, got {}",
                self.retained_capacity, self.spike_window
            )));
        }
        if !(self.leak_tolerance > 0.0 && self.leak_tolerance <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "leak_tolerance must be in (0, 1], got {}",
                self.leak_tolerance
            )));
        }
        if self.leak_growth_factor < 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "leak_growth_factor must be >= 1, got {}",
                self.leak_growth_factor
            )));
        }
        if self.spike_sigma <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "spike_sigma must be positive, got {}",
                self.spike_sigma
            )));
        }
        if self.warning_ratio >= self.critical_ratio {
            return Err(EngineError::InvalidConfig(format!(
                "warning_ratio ({}) must be below critical_ratio ({})",
                self.warning_ratio, self.critical_ratio
            )));
        }
        Ok(())
    }
}

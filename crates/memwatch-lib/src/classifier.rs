//! Threshold classification of ratio values into health buckets

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, DEFAULT_CRITICAL_RATIO, DEFAULT_WARNING_RATIO};
use crate::models::HealthBucket;

/// Maps ratio values to health buckets using fixed fleet-wide bounds
///
/// `ratio < warning` is healthy, `warning <= ratio < critical` is warning and
/// `ratio >= critical` is critical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdClassifier {
    pub warning_ratio: f64,
    pub critical_ratio: f64,
}

impl ThresholdClassifier {
    pub fn new(warning_ratio: f64, critical_ratio: f64) -> Self {
        Self {
            warning_ratio,
            critical_ratio,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.warning_ratio, config.critical_ratio)
    }

    pub fn classify(&self, ratio: f64) -> HealthBucket {
        if ratio >= self.critical_ratio {
            HealthBucket::Critical
        } else if ratio >= self.warning_ratio {
            HealthBucket::Warning
        } else {
            HealthBucket::Healthy
        }
    }

    /// Count ratios per bucket in a single pass
    pub fn counts<I>(&self, ratios: I) -> BucketCounts
    where
        I: IntoIterator<Item = f64>,
    {
        ratios
            .into_iter()
            .fold(BucketCounts::default(), |mut counts, ratio| {
                counts.record(self.classify(ratio));
                counts
            })
    }
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_RATIO, DEFAULT_CRITICAL_RATIO)
    }
}

/// Number of values in each health bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

impl BucketCounts {
    fn record(&mut self, bucket: HealthBucket) {
        match bucket {
            HealthBucket::Healthy => self.healthy += 1,
            HealthBucket::Warning => self.warning += 1,
            HealthBucket::Critical => self.critical += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical
    }

    pub fn get(&self, bucket: HealthBucket) -> usize {
        match bucket {
            HealthBucket::Healthy => self.healthy,
            HealthBucket::Warning => self.warning,
            HealthBucket::Critical => self.critical,
        }
    }
}

//! Anomaly detection for memory usage patterns
//!
//! This module provides detection for:
//! - Memory leaks (sustained growth over the most recent readings)
//! - Memory spikes (latest reading above mean + k standard deviations)
//! - Alert emission with per-evaluation deduplication

mod alerter;
mod leak_detector;
mod spike_detector;

pub use alerter::{
    Alert, AlertEmitter, AlertKind, AlertScope, AlertSeverity, AlertmanagerAlert,
    AlertmanagerPayload, FLEET_SCOPE, OPERATING_NORMALLY,
};
pub use leak_detector::{LeakAnomaly, LeakDetector};
pub use spike_detector::{SpikeAnomaly, SpikeDetector, WindowStats};

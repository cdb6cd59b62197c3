//! Core data models for the telemetry engine

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Kilobytes per megabyte for every KB -> MB conversion in the engine
pub const KB_PER_MB: f64 = 1024.0;

/// Record as delivered by the ingestion feed, before validation
///
/// Field names follow the reporting agents' JSON keys, e.g.
/// `{"SystemId":"sys-241","Pid":1234,"Process":"code","AllocKB":1542,"FreeKB":456,"Ratio":4.0,"LeakSuspect":false,"TimeStamp":1695023452}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRecord {
    #[serde(default)]
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, rename = "AllocKB", skip_serializing_if = "Option::is_none")]
    pub alloc_kb: Option<i64>,
    #[serde(default, rename = "FreeKB", skip_serializing_if = "Option::is_none")]
    pub free_kb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leak_suspect: Option<bool>,
    #[serde(default, rename = "TimeStamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// One validated memory reading for one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub system_id: String,
    pub timestamp_secs: i64,
    pub allocated_kb: u64,
    pub free_kb: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Allocated/free scalar, percentage-like and not normalized to [0, 1]
    pub ratio: f64,
    pub leak_suspect: bool,
}

impl Snapshot {
    pub fn allocated_mb(&self) -> f64 {
        self.allocated_kb as f64 / KB_PER_MB
    }

    pub fn free_mb(&self) -> f64 {
        self.free_kb as f64 / KB_PER_MB
    }

    /// Reading time as UTC, if the timestamp is representable
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp_secs, 0).single()
    }
}

/// Health bucket for a ratio value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthBucket {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthBucket::Healthy => write!(f, "healthy"),
            HealthBucket::Warning => write!(f, "warning"),
            HealthBucket::Critical => write!(f, "critical"),
        }
    }
}

/// Latest computed summary for one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub system_id: String,
    pub average_mb: f64,
    /// Presentation value, rounded to the nearest MB
    pub average_mb_rounded: i64,
    pub latest_ratio: f64,
    pub bucket: HealthBucket,
    pub data_points: usize,
    pub last_seen_secs: i64,
}

/// Fleet-wide view derived from every known system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetView {
    pub average_mb: f64,
    pub average_mb_rounded: i64,
    pub average_ratio: f64,
    pub systems: Vec<SystemSummary>,
}

/// Latest reading for one process on one system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub process_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub allocated_mb: f64,
    pub free_mb: f64,
    pub ratio: f64,
    pub leak_suspect: bool,
    pub timestamp_secs: i64,
}

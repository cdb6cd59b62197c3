//! Alert emission for anomaly detection
//!
//! Handles:
//! - Re-evaluating every known system's window against the detectors
//! - Per-snapshot flags (upstream leak suspicion, critical ratios)
//! - Fleet-wide pressure summaries
//! - Formatting alerts for an Alertmanager-style webhook
//!
//! The emitter keeps no alert history between calls. Each evaluation returns
//! the findings that are true right now; diffing against previously seen
//! alerts belongs to whoever delivers them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};

use super::{LeakAnomaly, LeakDetector, SpikeAnomaly, SpikeDetector};
use crate::classifier::ThresholdClassifier;
use crate::config::EngineConfig;
use crate::models::{HealthBucket, Snapshot};
use crate::store::WindowStore;

/// Scope value used for fleet-wide alerts
pub const FLEET_SCOPE: &str = "fleet";

/// Message of the entry returned when nothing is wrong
pub const OPERATING_NORMALLY: &str = "All systems are operating normally.";

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Only used for the "operating normally" entry
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    Leak,
    Spike,
    RatioThreshold,
    AggregateSummary,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Leak => write!(f, "leak"),
            AlertKind::Spike => write!(f, "spike"),
            AlertKind::RatioThreshold => write!(f, "ratio-threshold"),
            AlertKind::AggregateSummary => write!(f, "aggregate-summary"),
        }
    }
}

impl AlertKind {
    fn alertname(&self) -> &'static str {
        match self {
            AlertKind::Leak => "SystemMemoryLeak",
            AlertKind::Spike => "SystemMemorySpike",
            AlertKind::RatioThreshold => "SystemMemoryPressure",
            AlertKind::AggregateSummary => "FleetMemoryPressure",
        }
    }
}

/// Which part of the fleet an alert is about
///
/// Serialized as the bare system id, or `"fleet"` for global alerts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertScope {
    System(String),
    Fleet,
}

impl AlertScope {
    pub fn as_str(&self) -> &str {
        match self {
            AlertScope::System(id) => id,
            AlertScope::Fleet => FLEET_SCOPE,
        }
    }
}

impl std::fmt::Display for AlertScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AlertScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlertScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == FLEET_SCOPE {
            AlertScope::Fleet
        } else {
            AlertScope::System(raw)
        })
    }
}

/// An immutable detector finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub scope: AlertScope,
}

impl Alert {
    fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        scope: AlertScope,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity,
            message,
            timestamp,
            scope,
        }
    }

    /// The informational entry shown when no condition holds
    pub fn operating_normally(timestamp: DateTime<Utc>) -> Self {
        Self::new(
            AlertKind::AggregateSummary,
            AlertSeverity::Info,
            AlertScope::Fleet,
            OPERATING_NORMALLY.to_string(),
            timestamp,
        )
    }

    pub fn is_operating_normally(&self) -> bool {
        self.severity == AlertSeverity::Info && self.kind == AlertKind::AggregateSummary
    }

    /// Render as an Alertmanager webhook alert
    pub fn to_alertmanager(&self, node_name: &str) -> AlertmanagerAlert {
        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), self.kind.alertname().to_string());
        labels.insert("severity".to_string(), self.severity.to_string());
        labels.insert("kind".to_string(), self.kind.to_string());
        labels.insert("scope".to_string(), self.scope.to_string());
        labels.insert("node".to_string(), node_name.to_string());

        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), summary_line(self));
        annotations.insert("description".to_string(), self.message.clone());

        AlertmanagerAlert {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at: self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            ends_at: None,
            generator_url: None,
        }
    }
}

fn summary_line(alert: &Alert) -> String {
    match (&alert.kind, &alert.scope) {
        (AlertKind::Leak, scope) => format!("Memory leak suspected on {}", scope),
        (AlertKind::Spike, scope) => format!("Memory spike on {}", scope),
        (AlertKind::RatioThreshold, scope) => format!("Memory pressure on {}", scope),
        (AlertKind::AggregateSummary, _) => "Fleet memory pressure summary".to_string(),
    }
}

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (firing or resolved)
    pub status: String,
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    /// End time (empty for firing alerts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
    /// Generator URL for linking back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

/// Alertmanager webhook payload (array of alerts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

impl AlertmanagerPayload {
    /// Build a payload, leaving out the informational entry
    pub fn from_alerts(alerts: &[Alert], node_name: &str) -> Self {
        Self {
            alerts: alerts
                .iter()
                .filter(|a| !a.is_operating_normally())
                .map(|a| a.to_alertmanager(node_name))
                .collect(),
        }
    }
}

/// Key for deduplication within one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    kind: AlertKind,
    severity: AlertSeverity,
    scope: AlertScope,
}

impl DedupKey {
    fn of(alert: &Alert) -> Self {
        Self {
            kind: alert.kind,
            severity: alert.severity,
            scope: alert.scope.clone(),
        }
    }
}

/// Turns detector findings into an ordered alert list
#[derive(Debug, Clone)]
pub struct AlertEmitter {
    leak_detector: LeakDetector,
    spike_detector: SpikeDetector,
    classifier: ThresholdClassifier,
    /// Readings scanned for per-snapshot flags
    flag_window: usize,
}

impl AlertEmitter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            leak_detector: LeakDetector::from_config(config),
            spike_detector: SpikeDetector::from_config(config),
            classifier: ThresholdClassifier::from_config(config),
            flag_window: config.trend_capacity,
        }
    }

    /// Evaluate current window state, stamping every alert with `now`
    ///
    /// Systems are visited in id order, then fleet summaries follow. Repeated
    /// findings with the same kind, severity and scope are collapsed, first
    /// one wins. Returns a single informational entry when nothing holds.
    pub fn evaluate(&self, store: &WindowStore, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let mut latest_ratios = Vec::new();

        let depth = self
            .leak_detector
            .window
            .max(self.spike_detector.window)
            .max(self.flag_window);

        for system_id in store.known_systems() {
            let history = store.history(&system_id, depth);
            let Some(latest) = history.last() else {
                continue;
            };
            latest_ratios.push(latest.ratio);
            alerts.extend(self.evaluate_system(&system_id, &history, now));
        }

        alerts.extend(self.fleet_alerts(&latest_ratios, now));

        let mut seen = HashSet::new();
        alerts.retain(|alert| seen.insert(DedupKey::of(alert)));

        if alerts.is_empty() {
            alerts.push(Alert::operating_normally(now));
        }
        alerts
    }

    /// Findings for one system's history (oldest first)
    pub fn evaluate_system(
        &self,
        system_id: &str,
        history: &[Snapshot],
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let scope = || AlertScope::System(system_id.to_string());

        let samples: Vec<(i64, f64)> = history
            .iter()
            .map(|s| (s.timestamp_secs, s.allocated_mb()))
            .collect();

        if let Some(anomaly) = self.leak_detector.detect(&samples) {
            alerts.push(Alert::new(
                AlertKind::Leak,
                AlertSeverity::Warning,
                scope(),
                leak_message(system_id, &anomaly),
                now,
            ));
        }

        let flagged_window = &history[history.len().saturating_sub(self.flag_window)..];
        let suspects = flagged_window.iter().filter(|s| s.leak_suspect).count();
        if suspects > 0 {
            alerts.push(Alert::new(
                AlertKind::Leak,
                AlertSeverity::Warning,
                scope(),
                format!(
                    "Memory leak suspected by the reporting agent on {} in {} of the last {} report(s)",
                    system_id,
                    suspects,
                    flagged_window.len()
                ),
                now,
            ));
        }

        let values: Vec<f64> = samples.iter().map(|(_, mb)| *mb).collect();
        if let Some(anomaly) = self.spike_detector.detect(&values) {
            alerts.push(Alert::new(
                AlertKind::Spike,
                AlertSeverity::Critical,
                scope(),
                spike_message(system_id, &anomaly),
                now,
            ));
        }

        let critical: Vec<f64> = flagged_window
            .iter()
            .map(|s| s.ratio)
            .filter(|ratio| self.classifier.classify(*ratio) == HealthBucket::Critical)
            .collect();
        if let Some(peak) = critical.iter().copied().reduce(f64::max) {
            alerts.push(Alert::new(
                AlertKind::RatioThreshold,
                AlertSeverity::Critical,
                scope(),
                format!(
                    "Memory ratio at or above the critical bound {:.0} on {} in {} of the last {} report(s) (peak {:.1})",
                    self.classifier.critical_ratio,
                    system_id,
                    critical.len(),
                    flagged_window.len(),
                    peak
                ),
                now,
            ));
        }

        alerts
    }

    /// Fleet pressure summaries from each system's latest ratio
    fn fleet_alerts(&self, latest_ratios: &[f64], now: DateTime<Utc>) -> Vec<Alert> {
        let counts = self.classifier.counts(latest_ratios.iter().copied());
        let mut alerts = Vec::new();

        if counts.critical > 0 {
            alerts.push(Alert::new(
                AlertKind::AggregateSummary,
                AlertSeverity::Critical,
                AlertScope::Fleet,
                format!(
                    "Critical: {} system(s) show extreme memory pressure!",
                    counts.critical
                ),
                now,
            ));
        }
        if counts.warning > 0 {
            alerts.push(Alert::new(
                AlertKind::AggregateSummary,
                AlertSeverity::Warning,
                AlertScope::Fleet,
                format!(
                    "Warning: {} system(s) show rising memory pressure.",
                    counts.warning
                ),
                now,
            ));
        }

        alerts
    }
}

impl Default for AlertEmitter {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

fn leak_message(system_id: &str, anomaly: &LeakAnomaly) -> String {
    format!(
        "Potential memory leak on {}: allocation rose from {:.1} MB to {:.1} MB (+{:.0}%) over the last {} readings, growing {:.1} MB/hour with {:.0}% of steps non-decreasing",
        system_id,
        anomaly.oldest_mb,
        anomaly.newest_mb,
        anomaly.growth_percent,
        anomaly.samples_analyzed,
        anomaly.leak_rate_mb_per_hour(),
        anomaly.monotonicity * 100.0
    )
}

fn spike_message(system_id: &str, anomaly: &SpikeAnomaly) -> String {
    format!(
        "Abnormal memory spike on {}: {:.1} MB is {:.0}% above the mean of {:.1} MB (threshold {:.1} MB, z-score {:.1})",
        system_id,
        anomaly.current_mb,
        anomaly.percentage_above_mean(),
        anomaly.mean_mb,
        anomaly.threshold_mb,
        anomaly.z_score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn snapshot(system_id: &str, ts: i64, allocated_mb: f64, ratio: f64) -> Snapshot {
        Snapshot {
            system_id: system_id.to_string(),
            timestamp_secs: ts,
            allocated_kb: (allocated_mb * 1024.0) as u64,
            free_kb: 1024,
            process_name: None,
            pid: None,
            ratio,
            leak_suspect: false,
        }
    }

    fn fill(store: &WindowStore, system_id: &str, values: &[f64], ratio: f64) {
        for (i, v) in values.iter().enumerate() {
            store.append(snapshot(system_id, i as i64 * 60, *v, ratio));
        }
    }

    #[test]
    fn test_empty_store_is_operating_normally() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);

        let alerts = emitter.evaluate(&store, now());

        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].is_operating_normally());
        assert_eq!(alerts[0].scope, AlertScope::Fleet);
        assert_eq!(alerts[0].message, OPERATING_NORMALLY);
    }

    #[test]
    fn test_leak_alert_for_rising_system() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        fill(
            &store,
            "S",
            &[100.0, 102.0, 101.0, 103.0, 105.0, 108.0, 110.0, 115.0, 118.0, 125.0],
            50.0,
        );

        let alerts = emitter.evaluate(&store, now());

        let leak = alerts
            .iter()
            .find(|a| a.kind == AlertKind::Leak)
            .expect("leak alert");
        assert_eq!(leak.severity, AlertSeverity::Warning);
        assert_eq!(leak.scope, AlertScope::System("S".to_string()));
        assert!(leak.message.contains("S"));
        assert!(leak.message.contains("MB/hour"));
        assert!(leak.message.contains("89% of steps non-decreasing"));
        assert_eq!(leak.timestamp, now());
    }

    #[test]
    fn test_spike_alert_is_critical() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        fill(&store, "a", &[100.0, 102.0, 98.0, 101.0, 99.0, 600.0], 50.0);

        let alerts = emitter.evaluate(&store, now());

        let spike = alerts
            .iter()
            .find(|a| a.kind == AlertKind::Spike)
            .expect("spike alert");
        assert_eq!(spike.severity, AlertSeverity::Critical);
        assert_eq!(spike.scope.as_str(), "a");
        assert!(spike.message.contains("% above the mean"));
    }

    #[test]
    fn test_critical_ratio_raises_system_and_fleet_alerts() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        store.append(snapshot("hot", 1, 10.0, 320.0));
        store.append(snapshot("warm", 1, 10.0, 200.0));
        store.append(snapshot("cool", 1, 10.0, 20.0));

        let alerts = emitter.evaluate(&store, now());

        assert!(alerts.iter().any(|a| a.kind == AlertKind::RatioThreshold
            && a.scope == AlertScope::System("hot".to_string())));
        assert!(!alerts
            .iter()
            .any(|a| a.kind == AlertKind::RatioThreshold && a.scope.as_str() == "warm"));

        let fleet: Vec<&Alert> = alerts
            .iter()
            .filter(|a| a.scope == AlertScope::Fleet)
            .collect();
        assert_eq!(fleet.len(), 2);
        assert!(fleet[0].message.starts_with("Critical: 1 system(s)"));
        assert!(fleet[1].message.starts_with("Warning: 1 system(s)"));
    }

    #[test]
    fn test_earlier_critical_record_raises_alert() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        store.append(Snapshot {
            process_name: Some("hog".to_string()),
            ..snapshot("host", 1, 10.0, 900.0)
        });
        store.append(Snapshot {
            process_name: Some("idle".to_string()),
            ..snapshot("host", 2, 10.0, 20.0)
        });

        let alerts = emitter.evaluate(&store, now());

        let ratio = alerts
            .iter()
            .find(|a| a.kind == AlertKind::RatioThreshold)
            .expect("critical ratio alert");
        assert_eq!(ratio.severity, AlertSeverity::Critical);
        assert_eq!(ratio.scope.as_str(), "host");
        assert!(ratio.message.contains("1 of the last 2 report(s)"));
        assert!(ratio.message.contains("peak 900.0"));
        assert!(!alerts.iter().any(|a| a.severity == AlertSeverity::Info));
    }

    #[test]
    fn test_leak_suspect_flag_raises_alert() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        store.append(snapshot("a", 1, 10.0, 20.0));
        store.append(Snapshot {
            leak_suspect: true,
            ..snapshot("a", 2, 10.0, 20.0)
        });

        let alerts = emitter.evaluate(&store, now());

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Leak);
        assert!(alerts[0].message.contains("1 of the last 2"));
    }

    #[test]
    fn test_trend_and_flag_leaks_are_deduplicated() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        for (i, v) in [100.0, 102.0, 101.0, 103.0, 105.0, 108.0, 110.0, 115.0, 118.0, 125.0]
            .iter()
            .enumerate()
        {
            store.append(Snapshot {
                leak_suspect: true,
                ..snapshot("a", i as i64, *v, 20.0)
            });
        }

        let alerts = emitter.evaluate(&store, now());
        let leaks: Vec<&Alert> = alerts.iter().filter(|a| a.kind == AlertKind::Leak).collect();

        assert_eq!(leaks.len(), 1);
        assert!(leaks[0].message.starts_with("Potential memory leak"));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let emitter = AlertEmitter::default();
        let store = WindowStore::new(100);
        fill(&store, "a", &[100.0, 102.0, 98.0, 101.0, 99.0, 600.0], 400.0);
        fill(&store, "b", &[10.0, 10.0], 10.0);

        assert_eq!(emitter.evaluate(&store, now()), emitter.evaluate(&store, now()));
    }

    #[test]
    fn test_alert_serialization() {
        let alert = Alert::new(
            AlertKind::RatioThreshold,
            AlertSeverity::Critical,
            AlertScope::System("sys-1".to_string()),
            "msg".to_string(),
            now(),
        );

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["kind"], "ratio-threshold");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["scope"], "sys-1");

        let back: Alert = serde_json::from_value(json).unwrap();
        assert_eq!(back, alert);

        let fleet = serde_json::to_value(Alert::operating_normally(now())).unwrap();
        assert_eq!(fleet["scope"], "fleet");
        assert_eq!(fleet["kind"], "aggregate-summary");
        assert_eq!(fleet["severity"], "info");
    }

    #[test]
    fn test_alertmanager_payload_skips_informational_entry() {
        let alerts = vec![
            Alert::operating_normally(now()),
            Alert::new(
                AlertKind::Spike,
                AlertSeverity::Critical,
                AlertScope::System("a".to_string()),
                "spike".to_string(),
                now(),
            ),
        ];

        let payload = AlertmanagerPayload::from_alerts(&alerts, "node-1");

        assert_eq!(payload.alerts.len(), 1);
        let alert = &payload.alerts[0];
        assert_eq!(alert.status, "firing");
        assert_eq!(alert.labels.get("alertname").unwrap(), "SystemMemorySpike");
        assert_eq!(alert.labels.get("scope").unwrap(), "a");
        assert_eq!(alert.starts_at, "2024-01-01T00:00:00Z");
    }
}

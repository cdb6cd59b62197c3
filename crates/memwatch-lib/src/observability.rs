//! Observability infrastructure for the telemetry engine
//!
//! Provides:
//! - Prometheus metrics (ingestion counts, tracked systems, alerts, evaluation latency)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::anomaly::{Alert, AlertSeverity};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<EngineMetricsInner>> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    snapshots_ingested: IntCounter,
    records_rejected: IntCounter,
    systems_tracked: IntGauge,
    alerts_raised: IntCounterVec,
    evaluation_latency_seconds: Histogram,
    feed_connections: IntGauge,
}

impl EngineMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            snapshots_ingested: register_int_counter!(
                "memwatch_snapshots_ingested_total",
                "Total number of snapshots accepted into the window store"
            )?,
            records_rejected: register_int_counter!(
                "memwatch_records_rejected_total",
                "Total number of malformed records rejected at ingestion"
            )?,
            systems_tracked: register_int_gauge!(
                "memwatch_systems_tracked",
                "Number of systems with at least one retained snapshot"
            )?,
            alerts_raised: register_int_counter_vec!(
                "memwatch_alerts_raised_total",
                "Alerts produced by evaluation cycles, by kind and severity",
                &["kind", "severity"]
            )?,
            evaluation_latency_seconds: register_histogram!(
                "memwatch_evaluation_latency_seconds",
                "Time spent evaluating detectors across the fleet",
                LATENCY_BUCKETS.to_vec()
            )?,
            feed_connections: register_int_gauge!(
                "memwatch_feed_connections",
                "Open ingestion feed connections"
            )?,
        })
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics. If registration
/// fails every recording call is a no-op.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (registers global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match EngineMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register engine metrics");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&EngineMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    pub fn inc_snapshots_ingested(&self) {
        if let Some(m) = self.inner() {
            m.snapshots_ingested.inc();
        }
    }

    pub fn inc_records_rejected(&self) {
        if let Some(m) = self.inner() {
            m.records_rejected.inc();
        }
    }

    pub fn set_systems_tracked(&self, count: usize) {
        if let Some(m) = self.inner() {
            m.systems_tracked.set(count as i64);
        }
    }

    /// Count alerts from one evaluation, skipping the informational entry
    pub fn record_alerts(&self, alerts: &[Alert]) {
        let Some(m) = self.inner() else {
            return;
        };
        for alert in alerts.iter().filter(|a| a.severity != AlertSeverity::Info) {
            let kind = alert.kind.to_string();
            let severity = alert.severity.to_string();
            m.alerts_raised
                .with_label_values(&[kind.as_str(), severity.as_str()])
                .inc();
        }
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.evaluation_latency_seconds.observe(duration_secs);
        }
    }

    pub fn inc_feed_connections(&self) {
        if let Some(m) = self.inner() {
            m.feed_connections.inc();
        }
    }

    pub fn dec_feed_connections(&self) {
        if let Some(m) = self.inner() {
            m.feed_connections.dec();
        }
    }
}

/// Structured logger for engine events
///
/// Provides consistent JSON-formatted logging for ingestion, alerts,
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a rejected feed record
    pub fn log_record_rejected(&self, source: &str, reason: &str) {
        warn!(
            event = "record_rejected",
            node = %self.node_name,
            source = %source,
            reason = %reason,
            "Rejected malformed record"
        );
    }

    /// Log a newly raised alert
    pub fn log_alert(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                warn!(
                    event = "alert_raised",
                    node = %self.node_name,
                    kind = %alert.kind,
                    severity = %alert.severity,
                    scope = %alert.scope,
                    message = %alert.message,
                    "Critical alert raised"
                );
            }
            _ => {
                info!(
                    event = "alert_raised",
                    node = %self.node_name,
                    kind = %alert.kind,
                    severity = %alert.severity,
                    scope = %alert.scope,
                    message = %alert.message,
                    "Alert raised"
                );
            }
        }
    }

    /// Log a feed connection opening or closing
    pub fn log_feed_connection(&self, peer: &str, opened: bool) {
        info!(
            event = "feed_connection",
            node = %self.node_name,
            peer = %peer,
            opened = opened,
            "Feed connection {}",
            if opened { "accepted" } else { "closed" }
        );
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str, retained_capacity: usize) {
        info!(
            event = "engine_started",
            node = %self.node_name,
            version = %version,
            retained_capacity = retained_capacity,
            "Memwatch engine started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Memwatch engine shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AlertEmitter;
    use crate::store::WindowStore;

    #[test]
    fn test_engine_metrics_creation() {
        let metrics = EngineMetrics::new();

        metrics.inc_snapshots_ingested();
        metrics.inc_records_rejected();
        metrics.set_systems_tracked(3);
        metrics.observe_evaluation_latency(0.001);
        metrics.inc_feed_connections();
        metrics.dec_feed_connections();

        let alerts = AlertEmitter::default().evaluate(&WindowStore::new(10), chrono::Utc::now());
        metrics.record_alerts(&alerts);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name, "test-node");
    }
}

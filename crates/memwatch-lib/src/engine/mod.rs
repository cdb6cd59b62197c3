//! Engine facade
//!
//! Owns the window store and the detectors, and exposes the ingestion path
//! and the query boundary consumed by transports and presentation layers.
//! All computation is in-memory and bounded by window capacity.


use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::aggregator::{Aggregator, Scope};
use crate::anomaly::{Alert, AlertEmitter};
use crate::classifier::{BucketCounts, ThresholdClassifier};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{FleetView, HealthBucket, ProcessUsage, RawRecord, Snapshot, SystemSummary};
use crate::normalizer::normalize;
use crate::observability::EngineMetrics;
use crate::store::WindowStore;

/// Outcome of ingesting a batch of records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Rejection reasons, in input order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Telemetry aggregation and alerting engine
pub struct Engine {
    config: EngineConfig,
    store: WindowStore,
    emitter: AlertEmitter,
    classifier: ThresholdClassifier,
    metrics: EngineMetrics,
}

impl Engine {
    /// Create an engine after validating its configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: WindowStore::new(config.retained_capacity),
            emitter: AlertEmitter::new(&config),
            classifier: ThresholdClassifier::from_config(&config),
            metrics: EngineMetrics::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(&self.store, &self.config)
    }

    // Ingestion

    /// Normalize one raw record and append it to its system's window
    ///
    /// A malformed record is rejected on its own; nothing else is affected.
    pub fn ingest(&self, raw: &RawRecord) -> Result<Snapshot> {
        let snapshot = normalize(raw).map_err(|e| {
            self.metrics.inc_records_rejected();
            e
        })?;
        self.ingest_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    /// Append an already canonical snapshot
    pub fn ingest_snapshot(&self, snapshot: Snapshot) {
        let system_id = snapshot.system_id.clone();
        let len = self.store.append(snapshot);
        if len == 1 {
            self.metrics.set_systems_tracked(self.store.system_count());
        }
        self.metrics.inc_snapshots_ingested();
        debug!(system_id = %system_id, window_len = len, "Snapshot ingested");
    }

    /// Ingest every record, collecting rejections instead of stopping
    pub fn ingest_batch<'a, I>(&self, records: I) -> IngestReport
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut report = IngestReport::default();
        for raw in records {
            match self.ingest(raw) {
                Ok(_) => report.accepted += 1,
                Err(e) => {
                    report.rejected += 1;
                    report.errors.push(e.to_string());
                }
            }
        }
        report
    }

    // Window queries

    /// Latest snapshot, `None` while a system has no data
    pub fn latest(&self, system_id: &str) -> Option<Snapshot> {
        self.store.latest(system_id)
    }

    /// Last `min(k, len)` snapshots, oldest first
    pub fn history(&self, system_id: &str, k: usize) -> Vec<Snapshot> {
        self.store.history(system_id, k)
    }

    /// Short window used for live per-system trend views
    pub fn trend_history(&self, system_id: &str) -> Vec<Snapshot> {
        self.store.history(system_id, self.config.trend_capacity)
    }

    pub fn known_systems(&self) -> Vec<String> {
        self.store.known_systems()
    }

    pub fn is_known(&self, system_id: &str) -> bool {
        self.store.len(system_id) > 0
    }

    // Aggregates

    pub fn average_mb(&self, scope: Scope<'_>) -> f64 {
        self.aggregator().average_mb(scope)
    }

    pub fn system_average_mb(&self, system_id: &str) -> f64 {
        self.aggregator().system_average_mb(system_id)
    }

    pub fn fleet_average_mb(&self) -> f64 {
        self.aggregator().fleet_average_mb()
    }

    pub fn fleet_average_ratio(&self) -> f64 {
        self.aggregator().fleet_average_ratio()
    }

    pub fn system_summary(&self, system_id: &str) -> Option<SystemSummary> {
        self.aggregator().system_summary(system_id)
    }

    pub fn fleet_view(&self) -> FleetView {
        self.aggregator().fleet_view()
    }

    /// Bucket counts over each known system's latest ratio
    pub fn health_counts(&self) -> BucketCounts {
        self.aggregator().health_counts()
    }

    pub fn classify(&self, ratio: f64) -> HealthBucket {
        self.classifier.classify(ratio)
    }

    pub fn process_breakdown(&self, system_id: &str) -> Vec<ProcessUsage> {
        self.aggregator().process_breakdown(system_id)
    }

    // Alerts

    /// Current alert list, stamped with the current time
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts_at(Utc::now())
    }

    /// Current alert list, stamped with `now`
    pub fn alerts_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        self.emitter.evaluate(&self.store, now)
    }

    /// Alerts for a single system's current window
    pub fn system_alerts_at(&self, system_id: &str, now: DateTime<Utc>) -> Vec<Alert> {
        let history = self.store.history(system_id, self.config.retained_capacity);
        self.emitter.evaluate_system(system_id, &history, now)
    }
}

impl Default for Engine {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            store: WindowStore::new(config.retained_capacity),
            emitter: AlertEmitter::new(&config),
            classifier: ThresholdClassifier::from_config(&config),
            metrics: EngineMetrics::new(),
            config,
        }
    }
}

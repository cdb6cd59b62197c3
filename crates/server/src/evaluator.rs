//! Periodic alert evaluation
//!
//! The engine recomputes the full alert set on every call. This loop runs it
//! on a fixed interval and reports only the alerts that were not present in
//! the previous cycle.

use chrono::{DateTime, Utc};
use memwatch_lib::{
    anomaly::{Alert, AlertKind, AlertScope, AlertSeverity},
    health::HealthRegistry,
    observability::{EngineMetrics, StructuredLogger},
    Engine,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

type AlertKey = (AlertKind, AlertSeverity, AlertScope);

fn key_of(alert: &Alert) -> AlertKey {
    (alert.kind, alert.severity, alert.scope.clone())
}

/// Runs the alert emitter on an interval and diffs consecutive results
pub struct EvaluationLoop {
    engine: Arc<Engine>,
    health_registry: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
    interval: Duration,
    active: HashSet<AlertKey>,
}

impl EvaluationLoop {
    pub fn new(
        engine: Arc<Engine>,
        health_registry: HealthRegistry,
        metrics: EngineMetrics,
        logger: StructuredLogger,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            health_registry,
            metrics,
            logger,
            interval,
            active: HashSet::new(),
        }
    }

    /// Evaluate once and return the alerts that newly appeared
    ///
    /// Alerts that are no longer true drop out of the active set, so a
    /// condition that clears and returns is reported again.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        let alerts = self.engine.alerts_at(now);

        let current: HashSet<AlertKey> = alerts
            .iter()
            .filter(|a| !a.is_operating_normally())
            .map(key_of)
            .collect();

        let raised: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| !a.is_operating_normally() && !self.active.contains(&key_of(a)))
            .collect();

        let cleared = self.active.difference(&current).count();
        if cleared > 0 {
            debug!(cleared = cleared, "Alerts cleared since previous cycle");
        }

        self.active = current;
        raised
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting alert evaluation loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let raised = self.evaluate(Utc::now());
                    let elapsed = start.elapsed();

                    for alert in &raised {
                        self.logger.log_alert(alert);
                    }
                    self.metrics.record_alerts(&raised);
                    self.metrics.observe_evaluation_latency(elapsed.as_secs_f64());
                    self.metrics
                        .set_systems_tracked(self.engine.store().system_count());
                    self.health_registry
                        .observe_evaluation(elapsed, self.interval)
                        .await;

                    debug!(
                        raised = raised.len(),
                        active = self.active.len(),
                        elapsed_ms = elapsed.as_millis(),
                        "Evaluation cycle complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down alert evaluation loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use memwatch_lib::{EngineConfig, RawRecord};

    fn evaluation_loop(engine: Arc<Engine>) -> EvaluationLoop {
        EvaluationLoop::new(
            engine,
            HealthRegistry::new(),
            EngineMetrics::new(),
            StructuredLogger::new("test-node"),
            Duration::from_secs(5),
        )
    }

    fn ratio_record(system_id: &str, ts: i64, ratio: f64) -> RawRecord {
        RawRecord {
            system_id: system_id.to_string(),
            ratio: Some(ratio),
            timestamp: Some(ts),
            ..Default::default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_quiet_fleet_raises_nothing() {
        let mut evaluator = evaluation_loop(Arc::new(Engine::default()));

        assert!(evaluator.evaluate(at(0)).is_empty());
        assert_eq!(evaluator.active_count(), 0);
    }

    #[test]
    fn test_alert_is_reported_once_while_active() {
        let engine = Arc::new(Engine::default());
        let mut evaluator = evaluation_loop(Arc::clone(&engine));
        engine.ingest(&ratio_record("hot", 1, 450.0)).unwrap();

        let first = evaluator.evaluate(at(0));
        assert!(first
            .iter()
            .any(|a| a.kind == AlertKind::RatioThreshold && a.severity == AlertSeverity::Critical));

        engine.ingest(&ratio_record("hot", 2, 460.0)).unwrap();
        assert!(evaluator.evaluate(at(5)).is_empty());
    }

    #[test]
    fn test_cleared_alert_is_reported_again() {
        // Critical records only count while they are among the last two reports
        let config = EngineConfig {
            trend_capacity: 2,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::new(config).unwrap());
        let mut evaluator = evaluation_loop(Arc::clone(&engine));

        engine.ingest(&ratio_record("hot", 1, 450.0)).unwrap();
        assert!(!evaluator.evaluate(at(0)).is_empty());

        engine.ingest(&ratio_record("hot", 2, 10.0)).unwrap();
        assert!(evaluator.evaluate(at(5)).is_empty());
        assert_eq!(evaluator.active_count(), 1);

        engine.ingest(&ratio_record("hot", 3, 10.0)).unwrap();
        assert!(evaluator.evaluate(at(10)).is_empty());
        assert_eq!(evaluator.active_count(), 0);

        engine.ingest(&ratio_record("hot", 4, 450.0)).unwrap();
        let raised = evaluator.evaluate(at(15));
        assert!(raised
            .iter()
            .any(|a| a.scope == AlertScope::System("hot".to_string())));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let evaluator = evaluation_loop(Arc::new(Engine::default()));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(evaluator.run(rx));
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

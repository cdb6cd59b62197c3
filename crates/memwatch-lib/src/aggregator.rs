//! Scalar summaries over window contents
//!
//! A single aggregator serves both the per-system and the fleet-wide views,
//! selected by [`Scope`]. The fleet average is the unweighted mean of the
//! per-system averages, so a system that reports more often does not weigh
//! more in the fleet number.

use std::collections::HashMap;

use crate::classifier::{BucketCounts, ThresholdClassifier};
use crate::config::EngineConfig;
use crate::models::{FleetView, ProcessUsage, Snapshot, SystemSummary};
use crate::store::WindowStore;

/// Which systems an aggregate covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    System(&'a str),
    Fleet,
}

/// Mean allocated MB over an arbitrary set of snapshots, `0.0` when empty
pub fn mean_allocated_mb<'a, I>(snapshots: I) -> f64
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    let (sum, count) = snapshots
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), s| (sum + s.allocated_mb(), count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Read-only aggregation over a [`WindowStore`]
pub struct Aggregator<'a> {
    store: &'a WindowStore,
    classifier: ThresholdClassifier,
    trend_window: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a WindowStore, config: &EngineConfig) -> Self {
        Self {
            store,
            classifier: ThresholdClassifier::from_config(config),
            trend_window: config.trend_capacity,
        }
    }

    /// Average allocated MB for the given scope
    pub fn average_mb(&self, scope: Scope<'_>) -> f64 {
        match scope {
            Scope::System(system_id) => self
                .store
                .with_window(system_id, |w| mean_allocated_mb(w.iter()))
                .unwrap_or(0.0),
            Scope::Fleet => {
                let averages: Vec<f64> = self
                    .store
                    .known_systems()
                    .iter()
                    .map(|id| self.average_mb(Scope::System(id)))
                    .collect();
                mean(&averages)
            }
        }
    }

    /// Mean allocated MB over the system's full retained window
    ///
    /// Returns `0.0` for unknown systems; check `known_systems()` to tell
    /// "no data" apart from a genuine zero.
    pub fn system_average_mb(&self, system_id: &str) -> f64 {
        self.average_mb(Scope::System(system_id))
    }

    /// Mean of per-system averages across every known system
    pub fn fleet_average_mb(&self) -> f64 {
        self.average_mb(Scope::Fleet)
    }

    /// Mean of each known system's latest ratio
    pub fn fleet_average_ratio(&self) -> f64 {
        mean(&self.latest_ratios())
    }

    /// Bucket counts over each known system's latest ratio
    pub fn health_counts(&self) -> BucketCounts {
        self.classifier.counts(self.latest_ratios())
    }

    pub fn system_summary(&self, system_id: &str) -> Option<SystemSummary> {
        self.store
            .with_window(system_id, |w| {
                let latest = w.latest()?;
                let average_mb = mean_allocated_mb(w.iter());
                Some(SystemSummary {
                    system_id: system_id.to_string(),
                    average_mb,
                    average_mb_rounded: average_mb.round() as i64,
                    latest_ratio: latest.ratio,
                    bucket: self.classifier.classify(latest.ratio),
                    data_points: w.len(),
                    last_seen_secs: latest.timestamp_secs,
                })
            })
            .flatten()
    }

    /// Summaries for every known system plus fleet averages
    pub fn fleet_view(&self) -> FleetView {
        let systems: Vec<SystemSummary> = self
            .store
            .known_systems()
            .iter()
            .filter_map(|id| self.system_summary(id))
            .collect();

        let averages: Vec<f64> = systems.iter().map(|s| s.average_mb).collect();
        let ratios: Vec<f64> = systems.iter().map(|s| s.latest_ratio).collect();
        let average_mb = mean(&averages);

        FleetView {
            average_mb,
            average_mb_rounded: average_mb.round() as i64,
            average_ratio: mean(&ratios),
            systems,
        }
    }

    /// Latest reading per process name within the trend window
    ///
    /// Sorted by allocated MB, largest first. Snapshots without a process
    /// name are skipped.
    pub fn process_breakdown(&self, system_id: &str) -> Vec<ProcessUsage> {
        let history = self.store.history(system_id, self.trend_window);

        let mut latest: HashMap<&str, &Snapshot> = HashMap::new();
        for snapshot in &history {
            if let Some(name) = snapshot.process_name.as_deref() {
                latest.insert(name, snapshot);
            }
        }

        let mut usage: Vec<ProcessUsage> = latest
            .into_iter()
            .map(|(name, s)| ProcessUsage {
                process_name: name.to_string(),
                pid: s.pid,
                allocated_mb: s.allocated_mb(),
                free_mb: s.free_mb(),
                ratio: s.ratio,
                leak_suspect: s.leak_suspect,
                timestamp_secs: s.timestamp_secs,
            })
            .collect();

        usage.sort_by(|a, b| {
            b.allocated_mb
                .partial_cmp(&a.allocated_mb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.process_name.cmp(&b.process_name))
        });
        usage
    }

    fn latest_ratios(&self) -> Vec<f64> {
        self.store
            .known_systems()
            .iter()
            .filter_map(|id| self.store.latest(id))
            .map(|s| s.ratio)
            .collect()
    }
}

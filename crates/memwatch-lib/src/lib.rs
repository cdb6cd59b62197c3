//! Memory telemetry aggregation and alerting
//!
//! This crate provides the core functionality for:
//! - Normalizing raw memory reports into snapshots
//! - Bounded per-system history with FIFO eviction
//! - Per-system and fleet-wide aggregation
//! - Leak and spike detection, ratio classification and alert emission
//! - Health checks and observability

pub mod aggregator;
pub mod anomaly;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod normalizer;
pub mod observability;
pub mod store;

pub use aggregator::{Aggregator, Scope};
pub use anomaly::{Alert, AlertEmitter, AlertKind, AlertScope, AlertSeverity};
pub use classifier::{BucketCounts, ThresholdClassifier};
pub use config::EngineConfig;
pub use engine::{Engine, IngestReport};
pub use error::{EngineError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use store::WindowStore;

//! HTTP API: query boundary, ingestion, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use memwatch_lib::{
    anomaly::AlertmanagerPayload,
    codec::decode_line,
    health::{ComponentStatus, HealthRegistry},
    observability::{EngineMetrics, StructuredLogger},
    Engine,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
    pub logger: StructuredLogger,
    pub node_name: String,
}

impl AppState {
    pub fn new(
        engine: Arc<Engine>,
        health_registry: HealthRegistry,
        metrics: EngineMetrics,
        node_name: impl Into<String>,
    ) -> Self {
        let node_name = node_name.into();
        Self {
            engine,
            health_registry,
            metrics,
            logger: StructuredLogger::new(node_name.clone()),
            node_name,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn list_systems(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.known_systems())
}

/// Latest snapshot; `null` for a system that has not reported
async fn latest(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.latest(&system_id))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Non-positive limits yield an empty history
    pub limit: Option<i64>,
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let limit = match params.limit {
        Some(limit) => usize::try_from(limit.max(0)).unwrap_or(usize::MAX),
        None => state.engine.config().trend_capacity,
    };
    Json(state.engine.history(&system_id, limit))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.system_summary(&system_id))
}

async fn processes(
    State(state): State<Arc<AppState>>,
    Path(system_id): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.process_breakdown(&system_id))
}

async fn fleet(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.fleet_view())
}

async fn fleet_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.health_counts())
}

async fn alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.alerts())
}

/// Current alerts rendered for an Alertmanager webhook
async fn alertmanager(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let alerts = state.engine.alerts();
    Json(AlertmanagerPayload::from_alerts(&alerts, &state.node_name))
}

/// Accept one JSON record or an array of records over HTTP
async fn ingest(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    let records = match decode_line(&body, Utc::now().timestamp()) {
        Ok(records) => records,
        Err(e) => {
            state.metrics.inc_records_rejected();
            state.logger.log_record_rejected("http", &e.to_string());
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "accepted": 0, "rejected": 1, "errors": [e.to_string()] })),
            );
        }
    };

    let report = state.engine.ingest_batch(&records);
    for reason in &report.errors {
        state.logger.log_record_rejected("http", reason);
    }

    (StatusCode::OK, Json(json!(report)))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/ingest", post(ingest))
        .route("/api/systems", get(list_systems))
        .route("/api/systems/:id/latest", get(latest))
        .route("/api/systems/:id/history", get(history))
        .route("/api/systems/:id/summary", get(summary))
        .route("/api/systems/:id/processes", get(processes))
        .route("/api/fleet", get(fleet))
        .route("/api/fleet/health", get(fleet_health))
        .route("/api/alerts", get(alerts))
        .route("/api/alerts/alertmanager", get(alertmanager))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("API server stopped");
    Ok(())
}

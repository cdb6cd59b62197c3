//! Integration tests for the server HTTP endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use memwatch_lib::{
    health::{components, HealthRegistry},
    observability::EngineMetrics,
    Engine, RawRecord,
};
use memwatch_server::api::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState::new(
        Arc::new(Engine::default()),
        health_registry,
        EngineMetrics::new(),
        "test-node",
    ));
    let router = create_router(state.clone());

    (router, state)
}

fn record(system_id: &str, ts: i64, alloc_kb: i64, free_kb: i64) -> RawRecord {
    RawRecord {
        system_id: system_id.to_string(),
        alloc_kb: Some(alloc_kb),
        free_kb: Some(free_kb),
        timestamp: Some(ts),
        ..Default::default()
    }
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(app: Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["feed"].is_object());
    assert!(health["components"]["evaluator"].is_object());
    assert!(health["components"]["query_api"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::EVALUATOR, "Slow evaluation cycle")
        .await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::FEED, "Feed listener failed to bind")
        .await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_initialization() {
    let (app, state) = setup_test_app().await;

    let (status, readiness) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;
    state.metrics.inc_snapshots_ingested();
    state.metrics.observe_evaluation_latency(0.002);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("memwatch_snapshots_ingested_total"));
    assert!(metrics_text.contains("memwatch_evaluation_latency_seconds_bucket"));
}

#[tokio::test]
async fn test_unknown_system_is_not_an_error() {
    let (app, _state) = setup_test_app().await;

    let (status, latest) = get(app.clone(), "/api/systems/ghost/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert!(latest.is_null());

    let (status, history) = get(app, "/api/systems/ghost/history?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, serde_json::json!([]));
}

#[tokio::test]
async fn test_system_queries() {
    let (app, state) = setup_test_app().await;
    for ts in 1..=5 {
        state
            .engine
            .ingest(&record("sys-b", ts, ts * 1024, 1024))
            .unwrap();
    }
    state.engine.ingest(&record("sys-a", 1, 1024, 1024)).unwrap();

    let (_, systems) = get(app.clone(), "/api/systems").await;
    assert_eq!(systems, serde_json::json!(["sys-a", "sys-b"]));

    let (_, latest) = get(app.clone(), "/api/systems/sys-b/latest").await;
    assert_eq!(latest["system_id"], "sys-b");
    assert_eq!(latest["timestamp_secs"], 5);

    let (_, history) = get(app.clone(), "/api/systems/sys-b/history?limit=3").await;
    let timestamps: Vec<i64> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["timestamp_secs"].as_i64().unwrap())
        .collect();
    assert_eq!(timestamps, vec![3, 4, 5]);

    for uri in [
        "/api/systems/sys-b/history?limit=0",
        "/api/systems/sys-b/history?limit=-3",
    ] {
        let (status, history) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(history, serde_json::json!([]), "{}", uri);
    }

    let (_, history) = get(app.clone(), "/api/systems/sys-b/history?limit=999999").await;
    assert_eq!(history.as_array().unwrap().len(), 5);

    let (_, summary) = get(app, "/api/systems/sys-b/summary").await;
    assert_eq!(summary["average_mb"], 3.0);
    assert_eq!(summary["average_mb_rounded"], 3);
    assert_eq!(summary["data_points"], 5);
}

#[tokio::test]
async fn test_system_id_is_percent_decoded() {
    let (app, state) = setup_test_app().await;
    state
        .engine
        .ingest(&record("rack 1/node-7", 1, 1024, 1024))
        .unwrap();

    let (status, latest) = get(app, "/api/systems/rack%201%2Fnode-7/latest").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["system_id"], "rack 1/node-7");
}

#[tokio::test]
async fn test_fleet_queries() {
    let (app, state) = setup_test_app().await;
    state
        .engine
        .ingest(&record("calm", 1, 1024, 1024 * 1024))
        .unwrap();
    state.engine.ingest(&record("busy", 1, 2048, 1024)).unwrap();
    state.engine.ingest(&record("hot", 1, 4096, 1024)).unwrap();

    let (_, fleet) = get(app.clone(), "/api/fleet").await;
    assert_eq!(fleet["systems"].as_array().unwrap().len(), 3);

    let (_, counts) = get(app, "/api/fleet/health").await;
    assert_eq!(counts["healthy"], 1);
    assert_eq!(counts["warning"], 1);
    assert_eq!(counts["critical"], 1);
}

#[tokio::test]
async fn test_alerts_for_quiet_fleet() {
    let (app, _state) = setup_test_app().await;

    let (status, alerts) = get(app, "/api/alerts").await;

    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["message"], "All systems are operating normally.");
    assert_eq!(alerts[0]["severity"], "info");
    assert_eq!(alerts[0]["scope"], "fleet");
}

#[tokio::test]
async fn test_alertmanager_payload() {
    let (app, state) = setup_test_app().await;
    state.engine.ingest(&record("hot", 1, 4096, 1024)).unwrap();

    let (status, payload) = get(app, "/api/alerts/alertmanager").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!payload["alerts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_accepts_objects_and_arrays() {
    let (app, state) = setup_test_app().await;

    let (status, report) = post(
        app.clone(),
        "/api/ingest",
        r#"{"SystemId":"sys-241","Pid":1234,"Process":"code","AllocKB":1542,"FreeKB":456,"Ratio":4.0,"LeakSuspect":false,"TimeStamp":1695023452}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["accepted"], 1);

    let (status, report) = post(
        app,
        "/api/ingest",
        r#"[{"SystemId":"sys-241","AllocKB":1600,"FreeKB":400,"TimeStamp":1695023460},{"SystemId":"","AllocKB":1,"TimeStamp":1}]"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["accepted"], 1);
    assert_eq!(report["rejected"], 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 1);

    let latest = state.engine.latest("sys-241").unwrap();
    assert_eq!(latest.allocated_kb, 1600);
    assert_eq!(latest.pid, None);
}

#[tokio::test]
async fn test_ingest_rejects_garbage_body() {
    let (app, _state) = setup_test_app().await;

    let (status, report) = post(app, "/api/ingest", "not json at all").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(report["rejected"], 1);
}

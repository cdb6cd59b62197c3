//! Memwatch server - memory telemetry aggregation and alerting
//!
//! Accepts reports from reporting agents over a TCP feed, keeps bounded
//! per-system history, evaluates alerts on an interval and serves queries,
//! health and metrics over HTTP.

use anyhow::{Context, Result};
use memwatch_lib::{
    health::{components, HealthRegistry},
    observability::{EngineMetrics, StructuredLogger},
    Engine,
};
use memwatch_server::{
    api,
    config::ServerConfig,
    evaluator::EvaluationLoop,
    ingest::{self, FeedContext},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting memwatch-server");

    let config = ServerConfig::load()?;
    info!(
        node_name = %config.node_name,
        http_port = config.http_port,
        feed_port = config.feed_port,
        "Server configured"
    );

    let engine = Arc::new(Engine::new(config.engine.clone()).context("invalid engine policy")?);

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = EngineMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(SERVER_VERSION, config.engine.retained_capacity);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let app_state = Arc::new(api::AppState::new(
        Arc::clone(&engine),
        health_registry.clone(),
        metrics.clone(),
        config.node_name.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(
        config.http_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    let feed_ctx = FeedContext {
        engine: Arc::clone(&engine),
        metrics: metrics.clone(),
        logger: logger.clone(),
    };
    let feed_health = health_registry.clone();
    let feed_shutdown = shutdown_tx.subscribe();
    let feed_port = config.feed_port;
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = ingest::listen(feed_port, feed_ctx, feed_shutdown).await {
            error!(error = %e, "Ingestion feed stopped");
            feed_health
                .set_unhealthy(components::FEED, e.to_string())
                .await;
        }
    });

    let evaluator = EvaluationLoop::new(
        Arc::clone(&engine),
        health_registry.clone(),
        metrics.clone(),
        logger.clone(),
        config.evaluation_interval(),
    );
    let evaluator_handle = tokio::spawn(evaluator.run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Ok(Err(e)) = api_handle.await {
        error!(error = %e, "API server exited with error");
    }
    let _ = feed_handle.await;
    let _ = evaluator_handle.await;

    info!("Shutdown complete");
    Ok(())
}

//! Server configuration

use anyhow::{Context, Result};
use memwatch_lib::EngineConfig;
use serde::Deserialize;
use std::time::Duration;

/// Server configuration
///
/// Loaded from `MEMWATCH_*` environment variables. Engine policy values are
/// nested under `engine`, e.g. `MEMWATCH_ENGINE__RETAINED_CAPACITY=500`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name attached to logs and Alertmanager labels
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for the query, health and metrics endpoints
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port for the newline-delimited JSON ingestion feed
    #[serde(default = "default_feed_port")]
    pub feed_port: u16,

    /// Seconds between alert evaluation cycles
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "memwatch".to_string())
}

fn default_http_port() -> u16 {
    8080
}

fn default_feed_port() -> u16 {
    5000
}

fn default_evaluation_interval() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            http_port: default_http_port(),
            feed_port: default_feed_port(),
            evaluation_interval_secs: default_evaluation_interval(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let source = config::Environment::with_prefix("MEMWATCH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);
        Self::from_source(source)
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: ServerConfig = config::Config::builder()
            .add_source(source)
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.evaluation_interval_secs == 0 {
            anyhow::bail!("evaluation_interval_secs must be at least 1");
        }
        self.engine.validate().context("invalid engine policy")?;
        Ok(())
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }
}

//! API client for the memwatch server query boundary

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// API client for the memwatch server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        self.get_url(url).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Fetch server health; an unhealthy server still answers with a body
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.base_url.join("healthz").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        match response.status() {
            StatusCode::OK | StatusCode::SERVICE_UNAVAILABLE => {
                response.json().await.context("Failed to parse response")
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("API error ({}): {}", status, body)
            }
        }
    }

    pub async fn systems(&self) -> Result<Vec<String>> {
        self.get("api/systems").await
    }

    pub async fn latest(&self, system_id: &str) -> Result<Option<Snapshot>> {
        self.get_url(self.system_url(system_id, "latest")?).await
    }

    pub async fn history(&self, system_id: &str, limit: Option<usize>) -> Result<Vec<Snapshot>> {
        let mut url = self.system_url(system_id, "history")?;
        if let Some(limit) = limit {
            url.query_pairs_mut()
                .append_pair("limit", &limit.to_string());
        }
        self.get_url(url).await
    }

    pub async fn summary(&self, system_id: &str) -> Result<Option<SystemSummary>> {
        self.get_url(self.system_url(system_id, "summary")?).await
    }

    pub async fn processes(&self, system_id: &str) -> Result<Vec<ProcessUsage>> {
        self.get_url(self.system_url(system_id, "processes")?).await
    }

    pub async fn fleet(&self) -> Result<FleetView> {
        self.get("api/fleet").await
    }

    pub async fn fleet_health(&self) -> Result<BucketCounts> {
        self.get("api/fleet/health").await
    }

    pub async fn alerts(&self) -> Result<Vec<Alert>> {
        self.get("api/alerts").await
    }

    pub async fn ingest(&self, body: &serde_json::Value) -> Result<IngestReport> {
        self.post("api/ingest", body).await
    }

    /// `api/systems/{id}/{leaf}` with the system id percent-encoded
    fn system_url(&self, system_id: &str, leaf: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(["api", "systems", system_id, leaf]);
        Ok(url)
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub system_id: String,
    pub timestamp_secs: i64,
    pub allocated_kb: u64,
    pub free_kb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub ratio: f64,
    pub leak_suspect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSummary {
    pub system_id: String,
    pub average_mb: f64,
    pub average_mb_rounded: i64,
    pub latest_ratio: f64,
    pub bucket: String,
    pub data_points: usize,
    pub last_seen_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetView {
    pub average_mb: f64,
    pub average_mb_rounded: i64,
    pub average_ratio: f64,
    pub systems: Vec<SystemSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub process_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub allocated_mb: f64,
    pub free_mb: f64,
    pub ratio: f64,
    pub leak_suspect: bool,
    pub timestamp_secs: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub scope: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, ComponentHealth>,
}

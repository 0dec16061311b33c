//! Minimal Kubernetes API access used by the health checks.
//!
//! Only the handful of read-only calls the checks need are implemented:
//! server version, namespace lookup and pod listing.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ConnectionInfo;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Server version as reported by `/version`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerVersion {
    pub major: String,
    pub minor: String,
    #[serde(default)]
    pub git_version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restart_count: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    /// A pod is ready once it is running and every container reports ready.
    pub fn is_ready(&self) -> bool {
        self.status.phase.as_deref() == Some("Running")
            && !self.status.container_statuses.is_empty()
            && self.status.container_statuses.iter().all(|c| c.ready)
    }

    pub fn restart_count(&self) -> u32 {
        self.status
            .container_statuses
            .iter()
            .map(|c| c.restart_count)
            .sum()
    }
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

/// Read-only client for the Kubernetes API server
#[derive(Clone)]
pub struct KubeApi {
    client: Client,
    server: Url,
    token: Option<String>,
}

impl KubeApi {
    pub fn new(conn: &ConnectionInfo) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            server: conn.api_server.clone(),
            token: conn.token.clone(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self
            .server
            .join(path)
            .with_context(|| format!("Failed to build URL for path: {}", path))?;
        debug!("GET {}", url);

        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned status {}: {}", path, status, body.trim());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// Query the server version, the cheapest authenticated round trip.
    pub async fn version(&self) -> Result<ServerVersion> {
        self.get_json("version").await
    }

    pub async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let path = format!("api/v1/namespaces/{}", namespace);
        let response = self.get(&path).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => anyhow::bail!("GET {} returned status {}", path, status),
        }
    }

    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let list: PodList = self
            .get_json(&format!("api/v1/namespaces/{}/pods", namespace))
            .await?;
        Ok(list.items)
    }
}

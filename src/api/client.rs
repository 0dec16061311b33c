use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use super::types::{
    ApiError, ListPodsRequest, ListPodsResponse, SelfCheckRequest, SelfCheckResponse,
    VersionRequest, VersionResponse,
};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default CLI version (from Cargo.toml)
const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_user_agent() -> String {
    std::env::var("VIZGATE_USER_AGENT")
        .unwrap_or_else(|_| format!("vizgate/{}", DEFAULT_VERSION))
}

/// Handle to the viz metrics API.
///
/// Only ever handed to callers by the guarded acquisition flow (or
/// `raw_client` when validation is explicitly skipped).
pub struct VizApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    user_agent: String,
    session_id: String,
}

impl std::fmt::Debug for VizApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VizApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl VizApiClient {
    /// Create a client for the metrics API rooted at `base_url`
    pub fn new(base_url: Url, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token,
            user_agent: build_user_agent(),
            session_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint)
            .with_context(|| format!("Failed to build URL for endpoint: {}", endpoint))
    }

    async fn call_api<T, R>(&self, endpoint: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = self.build_url(endpoint)?;
        let request_id = Uuid::new_v4().to_string();

        debug!("=== Metrics API Request ===");
        debug!("URL: {}", url);

        let mut request = self
            .client
            .post(url.clone())
            .header("Content-Type", "application/json")
            .header("User-Agent", &self.user_agent)
            .header("x-request-id", &request_id)
            .header("x-request-session-id", &self.session_id);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        debug!("Status: {}", status);

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let api_error = ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            };
            error!("{}", api_error);
            return Err(api_error.into());
        }

        let response_text = response
            .text()
            .await
            .context("Failed to read response body")?;
        serde_json::from_str(&response_text).context("Failed to parse metrics API response")
    }

    /// Version of the running metrics API
    pub async fn version(&self) -> Result<VersionResponse> {
        self.call_api("api/Version", &VersionRequest {}).await
    }

    /// Ask the metrics API to report on its own dependencies
    pub async fn self_check(&self) -> Result<SelfCheckResponse> {
        self.call_api("api/SelfCheck", &SelfCheckRequest {}).await
    }

    /// List meshed pods, optionally restricted to one namespace
    pub async fn list_pods(&self, namespace: Option<&str>) -> Result<ListPodsResponse> {
        let request = ListPodsRequest {
            namespace: namespace.map(ToOwned::to_owned),
        };
        self.call_api("api/ListPods", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::CheckStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> VizApiClient {
        let url = Url::parse(&format!("{}/", server.uri())).unwrap();
        VizApiClient::new(url, Some("secret".to_string())).unwrap()
    }

    #[test]
    fn test_build_user_agent() {
        let ua = build_user_agent();
        assert!(ua.starts_with("vizgate/"));
    }

    #[tokio::test]
    async fn test_build_url_keeps_proxy_path() {
        let url = Url::parse(
            "https://cluster.example/api/v1/namespaces/linkerd-viz/services/metrics-api:8085/proxy/",
        )
        .unwrap();
        let client = VizApiClient::new(url, None).unwrap();
        assert_eq!(
            client.build_url("api/Version").unwrap().as_str(),
            "https://cluster.example/api/v1/namespaces/linkerd-viz/services/metrics-api:8085/proxy/api/Version"
        );
    }

    #[tokio::test]
    async fn test_self_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/SelfCheck"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "subsystemName": "linkerd-viz-api",
                        "checkDescription": "can query Prometheus",
                        "status": "FAIL",
                        "friendlyMessageToUser": "prometheus is unreachable"
                    }
                ]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server).await.self_check().await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn test_error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Version"))
            .respond_with(ResponseTemplate::new(503).set_body_string("no endpoints available"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.version().await.unwrap_err();
        let api_error = err.downcast_ref::<ApiError>().unwrap();
        assert!(matches!(api_error, ApiError::Status { status: 503, .. }));
    }
}

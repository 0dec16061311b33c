//! Wire types for the viz metrics API.

use serde::{Deserialize, Serialize};

/// Errors reported by the metrics API itself
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("metrics API call {endpoint} failed with status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Serialize)]
pub struct VersionRequest {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub release_version: String,
}

#[derive(Debug, Serialize)]
pub struct SelfCheckRequest {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Fail,
    Warning,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfCheckResult {
    pub subsystem_name: String,
    pub check_description: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub friendly_message_to_user: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelfCheckResponse {
    #[serde(default)]
    pub results: Vec<SelfCheckResult>,
}

impl SelfCheckResponse {
    /// Results that did not pass, in reported order
    pub fn failures(&self) -> impl Iterator<Item = &SelfCheckResult> {
        self.results.iter().filter(|r| r.status == CheckStatus::Fail)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPodsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub added: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPodsResponse {
    #[serde(default)]
    pub pods: Vec<PodSummary>,
}

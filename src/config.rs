//! Connection configuration for the cluster and the viz metrics API.
//!
//! Sources are merged in priority order:
//! 1. CLI flags (`--api-server`, `--token`, `--metrics-api-url`)
//! 2. Environment (`VIZGATE_API_SERVER`, `VIZGATE_TOKEN`, `VIZGATE_METRICS_API_URL`)
//! 3. `config.json` in the config directory (defaults to ~/.vizgate)
//!
//! Flags and environment are both handled by clap, so [`ConnectionSettings`]
//! only has to fall back to the file for whatever is still missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Namespace the viz extension is installed into
pub const DEFAULT_NAMESPACE: &str = "linkerd-viz";

/// Namespace of the control plane itself
pub const DEFAULT_CONTROL_PLANE_NAMESPACE: &str = "linkerd";

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Port the metrics API service listens on
const METRICS_API_PORT: u16 = 8085;

/// On-disk configuration stored in config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub api_server: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub metrics_api_url: Option<String>,
}

impl ConfigFile {
    /// Read a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Unresolved connection settings as collected from the command line.
///
/// Resolution is deferred until the first health check runs, so that a
/// broken configuration surfaces as a labeled check failure rather than a
/// bare startup error.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub api_server: Option<String>,
    pub token: Option<String>,
    pub metrics_api_url: Option<String>,
    pub config_dir: Option<String>,
}

impl ConnectionSettings {
    fn config_path(&self) -> Result<PathBuf> {
        let base_dir = match &self.config_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".vizgate"),
        };
        Ok(base_dir.join(CONFIG_FILE_NAME))
    }

    /// Merge flags/environment with the config file into a [`ConnectionInfo`].
    pub fn resolve(&self) -> Result<ConnectionInfo> {
        let file = if self.api_server.is_some() && self.metrics_api_url.is_some() {
            ConfigFile::default()
        } else {
            match self.config_path() {
                Ok(path) => ConfigFile::load(&path)?,
                Err(e) => {
                    warn!("Skipping config file: {}", e);
                    ConfigFile::default()
                }
            }
        };

        let api_server = self
            .api_server
            .clone()
            .or(file.api_server)
            .filter(|s| !s.is_empty())
            .context(
                "No Kubernetes API server configured (use --api-server, VIZGATE_API_SERVER or config.json)",
            )?;
        let api_server = parse_base_url(&api_server)
            .with_context(|| format!("Invalid API server URL: {}", api_server))?;

        let metrics_api_url = match self.metrics_api_url.clone().or(file.metrics_api_url) {
            Some(raw) if !raw.is_empty() => Some(
                parse_base_url(&raw)
                    .with_context(|| format!("Invalid metrics API URL: {}", raw))?,
            ),
            _ => None,
        };

        let token = self
            .token
            .clone()
            .or(file.token)
            .filter(|t| !t.is_empty());

        Ok(ConnectionInfo {
            api_server,
            token,
            metrics_api_url,
        })
    }
}

/// Resolved connection details for the cluster
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub api_server: Url,
    pub token: Option<String>,
    pub metrics_api_url: Option<Url>,
}

impl ConnectionInfo {
    /// Base URL of the metrics API for the given viz namespace.
    ///
    /// Without an explicit URL the API is reached through the Kubernetes
    /// service proxy of the API server.
    pub fn metrics_api_url(&self, namespace: &str) -> Result<Url> {
        if let Some(url) = &self.metrics_api_url {
            return Ok(url.clone());
        }

        let path = format!(
            "api/v1/namespaces/{}/services/metrics-api:{}/proxy/",
            namespace, METRICS_API_PORT
        );
        self.api_server
            .join(&path)
            .with_context(|| format!("Failed to build metrics API URL for namespace {}", namespace))
    }
}

/// Parse a URL and make sure it ends with `/` so relative joins keep the path.
fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

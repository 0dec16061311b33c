//! Client for the viz metrics API.
//!
//! [`VizApiClient`] is the handle the guarded acquisition flow hands out.
//! Construction goes through a [`ClientFactory`] so the health checks can
//! build it the same way on every retry attempt.

mod client;
mod types;

pub use client::VizApiClient;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::config::ConnectionInfo;

/// Builds a metrics API handle from cluster connection details.
///
/// Implementations must be cheap and idempotent: the check runner may call
/// them again on each retry attempt.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn new_client(&self, namespace: &str, conn: &ConnectionInfo) -> Result<VizApiClient>;
}

/// Reaches the metrics API from outside the cluster, either at an explicit
/// URL or through the API server's service proxy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalClientFactory;

#[async_trait]
impl ClientFactory for ExternalClientFactory {
    async fn new_client(&self, namespace: &str, conn: &ConnectionInfo) -> Result<VizApiClient> {
        let client = VizApiClient::new(conn.metrics_api_url(namespace)?, conn.token.clone())?;
        debug!("Using metrics API at {}", client.base_url());
        Ok(client)
    }
}

//! The standard checks behind each category.

use async_trait::async_trait;
use tracing::debug;

use super::{Catalog, Category, CheckCategory, CheckState, Checker, Probe, ProbeError};
use crate::kube::KubeApi;

/// Checks run against a real cluster
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCatalog;

impl Catalog for StandardCatalog {
    fn category(&self, id: CheckCategory) -> Option<Category> {
        let checkers = match id {
            CheckCategory::KubernetesApi => vec![
                Checker::new("can initialize the client", InitKubeClient).fatal(),
                Checker::new("can query the Kubernetes API", QueryKubeApi).fatal(),
            ],
            CheckCategory::LinkerdViz => vec![
                Checker::new("linkerd-viz Namespace exists", NamespaceExists).fatal(),
                Checker::new(
                    "viz extension pods are running",
                    PodsReady(PodsIn::Extension),
                )
                .retryable()
                .fatal(),
                Checker::new("viz extension pods have not restarted", NoRestarts).warning(),
                Checker::new("can initialize the viz API client", InitVizClient).fatal(),
                Checker::new("viz extension self-check", VizSelfCheck)
                    .retryable()
                    .fatal(),
            ],
            CheckCategory::LinkerdApi => vec![
                Checker::new(
                    "control plane pods are ready",
                    PodsReady(PodsIn::ControlPlane),
                )
                .retryable()
                .fatal(),
                Checker::new("can query the control plane API", QueryControlPlaneApi)
                    .retryable()
                    .fatal(),
            ],
        };
        Some(Category::new(id, checkers))
    }
}

struct InitKubeClient;

#[async_trait]
impl Probe for InitKubeClient {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let connection = state.options.connection.resolve()?;
        state.kube = Some(KubeApi::new(&connection)?);
        state.connection = Some(connection);
        Ok(())
    }
}

struct QueryKubeApi;

#[async_trait]
impl Probe for QueryKubeApi {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let version = state.kube()?.version().await?;
        debug!(
            "Kubernetes API server version {}.{} ({})",
            version.major, version.minor, version.git_version
        );
        Ok(())
    }
}

struct NamespaceExists;

#[async_trait]
impl Probe for NamespaceExists {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let namespace = &state.options.namespace;
        if state.kube()?.namespace_exists(namespace).await? {
            Ok(())
        } else {
            Err(ProbeError::failed(format!(
                "could not find the {} namespace",
                namespace
            )))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PodsIn {
    Extension,
    ControlPlane,
}

struct PodsReady(PodsIn);

#[async_trait]
impl Probe for PodsReady {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let namespace = match self.0 {
            PodsIn::Extension => &state.options.namespace,
            PodsIn::ControlPlane => &state.options.control_plane_namespace,
        };

        let pods = state.kube()?.list_pods(namespace).await?;
        if pods.is_empty() {
            return Err(ProbeError::failed(format!(
                "no pods found in the {} namespace",
                namespace
            )));
        }

        let not_ready: Vec<&str> = pods
            .iter()
            .filter(|pod| !pod.is_ready())
            .map(|pod| pod.metadata.name.as_str())
            .collect();
        if !not_ready.is_empty() {
            return Err(ProbeError::failed(format!(
                "pods not ready in {}: {}",
                namespace,
                not_ready.join(", ")
            )));
        }

        Ok(())
    }
}

struct NoRestarts;

#[async_trait]
impl Probe for NoRestarts {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let namespace = &state.options.namespace;
        let restarted: Vec<String> = state
            .kube()?
            .list_pods(namespace)
            .await?
            .iter()
            .filter(|pod| pod.restart_count() > 0)
            .map(|pod| format!("{} ({})", pod.metadata.name, pod.restart_count()))
            .collect();

        if restarted.is_empty() {
            Ok(())
        } else {
            Err(ProbeError::failed(format!(
                "pods restarted in {}: {}",
                namespace,
                restarted.join(", ")
            )))
        }
    }
}

struct InitVizClient;

#[async_trait]
impl Probe for InitVizClient {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let client = state
            .factory()
            .new_client(&state.options.namespace, state.connection()?)
            .await?;
        state.client = Some(client);
        Ok(())
    }
}

struct VizSelfCheck;

#[async_trait]
impl Probe for VizSelfCheck {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let response = state.client()?.self_check().await?;
        let failures: Vec<String> = response
            .failures()
            .map(|r| {
                if r.friendly_message_to_user.is_empty() {
                    format!("{}: {}", r.subsystem_name, r.check_description)
                } else {
                    format!("{}: {}", r.check_description, r.friendly_message_to_user)
                }
            })
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ProbeError::failed(failures.join("; ")))
        }
    }
}

struct QueryControlPlaneApi;

#[async_trait]
impl Probe for QueryControlPlaneApi {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError> {
        let version = state.client()?.version().await?;
        debug!("Metrics API version {}", version.release_version);
        Ok(())
    }
}

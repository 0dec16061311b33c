//! Guarded acquisition of the viz API client.
//!
//! Commands that talk to the metrics API never build the client directly.
//! They go through [`Guard`], which runs the cluster and extension checks
//! first and only hands the client over once they pass. Any hard failure is
//! reported on stderr and ends the process with status 1, so the public entry
//! points have no error path.

mod policy;

pub use policy::{ExitPolicy, Terminal, CHECK_CMD};

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::{ClientFactory, VizApiClient};
use crate::config::ConnectionSettings;
use crate::healthcheck::{
    Catalog, CheckCategory, HealthCheckOptions, HealthChecker, RunError, RunOutcome,
    StandardCatalog,
};

/// How much validation to do before handing out a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Cluster and extension checks, never retried
    Strict,
    /// Honors the caller's retry deadline; optionally adds control plane API checks
    Flexible { api_checks: bool },
}

/// Categories to run for `mode`, in order
pub fn check_plan(mode: AcquireMode) -> Vec<CheckCategory> {
    let mut plan = vec![CheckCategory::KubernetesApi, CheckCategory::LinkerdViz];
    if let AcquireMode::Flexible { api_checks: true } = mode {
        plan.push(CheckCategory::LinkerdApi);
    }
    plan
}

/// Build a client with no validation at all
pub async fn raw_client(
    factory: &dyn ClientFactory,
    namespace: &str,
    settings: &ConnectionSettings,
) -> Result<VizApiClient> {
    let conn = settings.resolve()?;
    factory.new_client(namespace, &conn).await
}

pub struct Guard<C: Catalog = StandardCatalog> {
    catalog: C,
    factory: Arc<dyn ClientFactory>,
}

impl Guard {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_catalog(StandardCatalog, factory)
    }
}

impl<C: Catalog> Guard<C> {
    pub fn with_catalog(catalog: C, factory: Arc<dyn ClientFactory>) -> Self {
        Self { catalog, factory }
    }

    /// Run the checks for `mode` with `policy` as the observer.
    pub async fn acquire<W: Write, T: Terminal>(
        &self,
        mut options: HealthCheckOptions,
        mode: AcquireMode,
        policy: &mut ExitPolicy<W, T>,
    ) -> Result<RunOutcome, RunError> {
        if mode == AcquireMode::Strict {
            options.retry_deadline = None;
        }

        let plan = check_plan(mode);
        debug!("Acquiring viz API client with checks {:?}", plan);

        HealthChecker::new(&self.catalog, &plan, options, self.factory.clone())
            .run_checks(|result| policy.observe(result))
            .await
    }

    /// Validate without retrying and return the client, or exit.
    pub async fn check_client_or_exit(&self, options: HealthCheckOptions) -> VizApiClient {
        self.acquire_or_exit(options, AcquireMode::Strict).await
    }

    /// Validate, waiting out transient failures until the options' retry
    /// deadline, and return the client, or exit.
    pub async fn check_client_or_retry_or_exit(
        &self,
        options: HealthCheckOptions,
        api_checks: bool,
    ) -> VizApiClient {
        self.acquire_or_exit(options, AcquireMode::Flexible { api_checks })
            .await
    }

    async fn acquire_or_exit(&self, options: HealthCheckOptions, mode: AcquireMode) -> VizApiClient {
        let mut policy = ExitPolicy::stderr();
        match self.acquire(options, mode, &mut policy).await {
            Ok(outcome) => outcome.client,
            Err(err) => {
                // Only reachable when the run ends without the policy seeing a
                // hard failure, e.g. a plan that never builds the client.
                error!("{}", err);
                eprintln!("Validate the install with: {}", CHECK_CMD);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::policy::testing::RecordingTerminal;
    use super::policy::RETRY_NOTICE;
    use super::*;
    use crate::healthcheck::testing::{
        options, Flags, ScriptedCatalog, ScriptedProbe, Step, UnusedFactory,
    };
    use std::time::Duration;

    fn guard(catalog: ScriptedCatalog) -> Guard<ScriptedCatalog> {
        Guard::with_catalog(catalog, Arc::new(UnusedFactory))
    }

    fn policy() -> ExitPolicy<Vec<u8>, RecordingTerminal> {
        ExitPolicy::new(Vec::new(), RecordingTerminal::default())
    }

    fn output(policy: ExitPolicy<Vec<u8>, RecordingTerminal>) -> (Vec<String>, Vec<i32>) {
        let (out, terminal) = policy.into_parts();
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(ToOwned::to_owned)
            .collect();
        (lines, terminal.codes)
    }

    fn retryable() -> Flags {
        Flags {
            retryable: true,
            ..Flags::default()
        }
    }

    #[test]
    fn test_check_plan() {
        assert_eq!(
            check_plan(AcquireMode::Strict),
            vec![CheckCategory::KubernetesApi, CheckCategory::LinkerdViz]
        );
        assert_eq!(
            check_plan(AcquireMode::Flexible { api_checks: false }),
            check_plan(AcquireMode::Strict)
        );
        assert_eq!(
            check_plan(AcquireMode::Flexible { api_checks: true }),
            vec![
                CheckCategory::KubernetesApi,
                CheckCategory::LinkerdViz,
                CheckCategory::LinkerdApi
            ]
        );
    }

    #[tokio::test]
    async fn test_all_pass_is_silent() {
        let catalog = ScriptedCatalog::default()
            .with(
                CheckCategory::KubernetesApi,
                "can query the Kubernetes API",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]),
            )
            .with(
                CheckCategory::LinkerdViz,
                "can initialize the viz API client",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]).establishing_client(),
            );

        let mut policy = policy();
        let outcome = guard(catalog)
            .acquire(options(), AcquireMode::Strict, &mut policy)
            .await;

        assert!(outcome.is_ok());
        let (lines, codes) = output(policy);
        assert!(lines.is_empty());
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_failure_exits_before_extension() {
        let extension = ScriptedProbe::new(&[Step::Pass]).establishing_client();
        let catalog = ScriptedCatalog::default()
            .with(
                CheckCategory::KubernetesApi,
                "can query the Kubernetes API",
                Flags::default(),
                ScriptedProbe::new(&[Step::Fail]),
            )
            .with(
                CheckCategory::LinkerdViz,
                "can initialize the viz API client",
                Flags::default(),
                extension.clone(),
            );

        let mut policy = policy();
        let err = guard(catalog)
            .acquire(options(), AcquireMode::Strict, &mut policy)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Halted { .. }));
        assert_eq!(extension.calls(), 0);
        let (lines, codes) = output(policy);
        assert_eq!(
            lines,
            vec![
                "Cannot connect to Kubernetes: connection refused".to_string(),
                "Validate the install with: linkerd viz check".to_string(),
            ]
        );
        assert_eq!(codes, vec![1]);
    }

    #[tokio::test]
    async fn test_warning_proceeds_silently() {
        let catalog = ScriptedCatalog::default()
            .with(
                CheckCategory::KubernetesApi,
                "is running the minimum Kubernetes API version",
                Flags {
                    warning: true,
                    ..Flags::default()
                },
                ScriptedProbe::new(&[Step::Fail]),
            )
            .with(
                CheckCategory::LinkerdViz,
                "can initialize the viz API client",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]).establishing_client(),
            );

        let mut policy = policy();
        let outcome = guard(catalog)
            .acquire(options(), AcquireMode::Strict, &mut policy)
            .await
            .unwrap();

        assert_eq!(outcome.warnings, 1);
        let (lines, codes) = output(policy);
        assert!(lines.is_empty());
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn test_flexible_mode_waits_for_availability() {
        let catalog = ScriptedCatalog::default()
            .with(
                CheckCategory::KubernetesApi,
                "can query the Kubernetes API",
                retryable(),
                ScriptedProbe::new(&[Step::Fail, Step::Fail, Step::Pass]),
            )
            .with(
                CheckCategory::LinkerdViz,
                "can initialize the viz API client",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]).establishing_client(),
            );

        let options = options().with_wait(Duration::from_secs(300));
        let mut policy = policy();
        let outcome = guard(catalog)
            .acquire(
                options,
                AcquireMode::Flexible { api_checks: false },
                &mut policy,
            )
            .await;

        assert!(outcome.is_ok());
        let (lines, codes) = output(policy);
        assert_eq!(lines, vec![RETRY_NOTICE.to_string(), RETRY_NOTICE.to_string()]);
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn test_strict_mode_ignores_retry_deadline() {
        let flaky = ScriptedProbe::new(&[Step::Fail, Step::Pass]);
        let catalog = ScriptedCatalog::default()
            .with(
                CheckCategory::KubernetesApi,
                "can query the Kubernetes API",
                retryable(),
                flaky.clone(),
            )
            .with(
                CheckCategory::LinkerdViz,
                "can initialize the viz API client",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]).establishing_client(),
            );

        let options = options().with_wait(Duration::from_secs(300));
        let mut policy = policy();
        let err = guard(catalog)
            .acquire(options, AcquireMode::Strict, &mut policy)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Halted { .. }));
        assert_eq!(flaky.calls(), 1);
        let (lines, codes) = output(policy);
        assert_eq!(lines.len(), 2);
        assert!(!lines.contains(&RETRY_NOTICE.to_string()));
        assert_eq!(codes, vec![1]);
    }

    #[tokio::test]
    async fn test_expired_deadline_takes_hard_failure_path() {
        let catalog = ScriptedCatalog::default().with(
            CheckCategory::LinkerdViz,
            "viz extension pods are running",
            retryable(),
            ScriptedProbe::new(&[Step::Fail]),
        );

        let mut options = options().with_wait(Duration::from_millis(30));
        options.retry_interval = Duration::from_millis(10);
        let mut policy = policy();
        let err = guard(catalog)
            .acquire(
                options,
                AcquireMode::Flexible { api_checks: false },
                &mut policy,
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Halted {
                category: CheckCategory::LinkerdViz
            }
        ));
        let (lines, codes) = output(policy);
        let (notices, rest): (Vec<_>, Vec<_>) =
            lines.iter().partition(|line| line.as_str() == RETRY_NOTICE);
        assert!(!notices.is_empty());
        assert_eq!(
            rest,
            vec![
                "Cannot connect to Linkerd Viz: connection refused",
                "Validate the install with: linkerd viz check",
            ]
        );
        assert_eq!(codes, vec![1]);
    }

    #[tokio::test]
    async fn test_api_checks_run_last() {
        let api = ScriptedProbe::new(&[Step::Pass]);
        let catalog = ScriptedCatalog::default()
            .with(
                CheckCategory::KubernetesApi,
                "can query the Kubernetes API",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]),
            )
            .with(
                CheckCategory::LinkerdViz,
                "can initialize the viz API client",
                Flags::default(),
                ScriptedProbe::new(&[Step::Pass]).establishing_client(),
            )
            .with(
                CheckCategory::LinkerdApi,
                "can query the control plane API",
                Flags::default(),
                api.clone(),
            );

        let guard = guard(catalog);
        let mut policy = policy();
        guard
            .acquire(options(), AcquireMode::Strict, &mut policy)
            .await
            .unwrap();
        assert_eq!(api.calls(), 0);

        guard
            .acquire(
                options(),
                AcquireMode::Flexible { api_checks: true },
                &mut policy,
            )
            .await
            .unwrap();
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn test_raw_client_skips_checks() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let settings = ConnectionSettings {
            api_server: Some("https://cluster.example:6443".to_string()),
            config_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            ..ConnectionSettings::default()
        };

        let client = raw_client(&crate::api::ExternalClientFactory, "linkerd-viz", &settings)
            .await
            .unwrap();
        assert!(client
            .base_url()
            .as_str()
            .starts_with("https://cluster.example:6443/api/v1/namespaces/linkerd-viz/"));
    }
}

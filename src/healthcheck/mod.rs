//! Categorized health checks and the runner that sequences them.
//!
//! A run walks the enabled categories in plan order and each checker in
//! category order, handing every [`CheckResult`] to a caller-supplied
//! observer before moving on. Retryable checkers are re-attempted while the
//! retry deadline is open; once it closes, the next failure is delivered as
//! an ordinary hard failure.
//!
//! The runner never decides whether a failure is fatal to the process.
//! That belongs to the observer, which can stop the run by returning
//! [`ControlFlow::Break`].

mod catalog;

pub use catalog::StandardCatalog;

use async_trait::async_trait;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::api::{ClientFactory, VizApiClient};
use crate::config::{ConnectionInfo, ConnectionSettings, DEFAULT_CONTROL_PLANE_NAMESPACE};
use crate::kube::KubeApi;

/// Pause between attempts of a retryable checker
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Longest retry window `--wait` can open
pub const MAX_RETRY_WINDOW: Duration = Duration::from_secs(u32::MAX as u64);

/// A named group of related checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckCategory {
    /// Reachability of the Kubernetes API
    KubernetesApi,
    /// The viz extension and its metrics API
    LinkerdViz,
    /// The control plane API behind the extension
    LinkerdApi,
}

impl CheckCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::KubernetesApi => "kubernetes-api",
            CheckCategory::LinkerdViz => "linkerd-viz",
            CheckCategory::LinkerdApi => "linkerd-control-plane-api",
        }
    }
}

impl std::fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single probe failed
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// An earlier check that this one depends on did not run or failed
    #[error("{0} has not been initialized")]
    Uninitialized(&'static str),
    #[error("{0}")]
    Failed(String),
    /// Rendered with the full context chain, e.g. `<context>: <cause>`
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ProbeError::Failed(msg.into())
    }
}

/// Outcome of one probe attempt, delivered to the observer
#[derive(Debug)]
pub struct CheckResult {
    pub category: CheckCategory,
    pub description: String,
    /// Transient failure; the runner will try this checker again
    pub retry: bool,
    /// A failure here is advisory only
    pub warning: bool,
    pub err: Option<ProbeError>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.err.is_none()
    }

    /// Failed, not retrying, and not downgraded to a warning
    pub fn is_hard_failure(&self) -> bool {
        !self.retry && !self.warning && self.err.is_some()
    }
}

/// Options shared by every check in a run
#[derive(Debug, Clone)]
pub struct HealthCheckOptions {
    /// Namespace of the viz extension
    pub namespace: String,
    pub control_plane_namespace: String,
    pub connection: ConnectionSettings,
    /// Retryable failures are tolerated until this instant. `None` disables retries.
    pub retry_deadline: Option<Instant>,
    pub retry_interval: Duration,
}

impl HealthCheckOptions {
    pub fn new(namespace: impl Into<String>, connection: ConnectionSettings) -> Self {
        Self {
            namespace: namespace.into(),
            control_plane_namespace: DEFAULT_CONTROL_PLANE_NAMESPACE.to_string(),
            connection,
            retry_deadline: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Open a retry window of `wait` from now. A zero wait leaves retries off.
    /// Waits too long to represent are clamped to [`MAX_RETRY_WINDOW`].
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.retry_deadline = if wait.is_zero() {
            None
        } else {
            let now = Instant::now();
            Some(
                now.checked_add(wait)
                    .or_else(|| now.checked_add(MAX_RETRY_WINDOW))
                    .unwrap_or(now),
            )
        };
        self
    }

    pub fn retry_window_open(&self) -> bool {
        self.retry_deadline
            .map(|deadline| Instant::now() < deadline)
            .unwrap_or(false)
    }
}

/// State built up by the checks of a single run.
///
/// Later checks read what earlier ones established: the resolved connection,
/// the Kubernetes client, and finally the metrics API handle.
pub struct CheckState {
    pub options: HealthCheckOptions,
    pub connection: Option<ConnectionInfo>,
    pub kube: Option<KubeApi>,
    pub client: Option<VizApiClient>,
    factory: Arc<dyn ClientFactory>,
}

impl CheckState {
    pub fn new(options: HealthCheckOptions, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            options,
            connection: None,
            kube: None,
            client: None,
            factory,
        }
    }

    pub fn factory(&self) -> &dyn ClientFactory {
        self.factory.as_ref()
    }

    pub fn connection(&self) -> Result<&ConnectionInfo, ProbeError> {
        self.connection
            .as_ref()
            .ok_or(ProbeError::Uninitialized("cluster connection"))
    }

    pub fn kube(&self) -> Result<&KubeApi, ProbeError> {
        self.kube
            .as_ref()
            .ok_or(ProbeError::Uninitialized("Kubernetes client"))
    }

    pub fn client(&self) -> Result<&VizApiClient, ProbeError> {
        self.client
            .as_ref()
            .ok_or(ProbeError::Uninitialized("viz API client"))
    }
}

/// One individual health probe
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, state: &mut CheckState) -> Result<(), ProbeError>;
}

/// A probe plus the flags that decide how its failures are treated
pub struct Checker {
    pub description: String,
    pub warning: bool,
    pub fatal: bool,
    pub retryable: bool,
    probe: Box<dyn Probe>,
}

impl Checker {
    pub fn new(description: impl Into<String>, probe: impl Probe + 'static) -> Self {
        Self {
            description: description.into(),
            warning: false,
            fatal: false,
            retryable: false,
            probe: Box::new(probe),
        }
    }

    pub fn warning(mut self) -> Self {
        self.warning = true;
        self
    }

    /// A hard failure stops the whole run
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Failures are retried while the retry deadline is open
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

pub struct Category {
    pub id: CheckCategory,
    pub checkers: Vec<Checker>,
}

impl Category {
    pub fn new(id: CheckCategory, checkers: Vec<Checker>) -> Self {
        Self { id, checkers }
    }
}

/// Source of the checks behind each category
pub trait Catalog {
    fn category(&self, id: CheckCategory) -> Option<Category>;
}

/// Successful end of a run
#[derive(Debug)]
pub struct RunOutcome {
    pub client: VizApiClient,
    /// Failed checks that were only warnings
    pub warnings: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("health checks halted by observer in category {category}")]
    Halted { category: CheckCategory },
    #[error("{category}: {description}")]
    Failed {
        category: CheckCategory,
        description: String,
    },
    #[error("{0} health check(s) failed")]
    ChecksFailed(usize),
    #[error("health checks passed but no viz API client was established")]
    NoClient,
}

/// Runs an ordered plan of check categories
pub struct HealthChecker {
    categories: Vec<Category>,
    state: CheckState,
}

impl HealthChecker {
    /// Build a checker for `plan`, in plan order, from `catalog`.
    pub fn new(
        catalog: &dyn Catalog,
        plan: &[CheckCategory],
        options: HealthCheckOptions,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let categories = plan
            .iter()
            .filter_map(|id| {
                let category = catalog.category(*id);
                if category.is_none() {
                    warn!("No checks registered for category {}", id);
                }
                category
            })
            .collect();

        Self {
            categories,
            state: CheckState::new(options, factory),
        }
    }

    /// Execute every category and hand each result to `observer`.
    ///
    /// On success the metrics API handle established during the run is
    /// returned to the caller; the checker is consumed, so the handle can
    /// only be taken once.
    pub async fn run_checks<F>(self, mut observer: F) -> Result<RunOutcome, RunError>
    where
        F: FnMut(&CheckResult) -> ControlFlow<()>,
    {
        let Self {
            categories,
            mut state,
        } = self;

        let mut failures = 0;
        let mut warnings = 0;

        for category in &categories {
            debug!("Running {} checks", category.id);
            for checker in &category.checkers {
                let passed = run_checker(category.id, checker, &mut state, &mut observer).await?;
                if passed {
                    continue;
                }
                if checker.warning {
                    warnings += 1;
                    continue;
                }
                failures += 1;
                if checker.fatal {
                    return Err(RunError::Failed {
                        category: category.id,
                        description: checker.description.clone(),
                    });
                }
            }
        }

        if failures > 0 {
            return Err(RunError::ChecksFailed(failures));
        }

        let client = state.client.take().ok_or(RunError::NoClient)?;
        Ok(RunOutcome { client, warnings })
    }
}

async fn run_checker<F>(
    category: CheckCategory,
    checker: &Checker,
    state: &mut CheckState,
    observer: &mut F,
) -> Result<bool, RunError>
where
    F: FnMut(&CheckResult) -> ControlFlow<()>,
{
    loop {
        let err = checker.probe.check(state).await.err();
        let retry = err.is_some() && checker.retryable && state.options.retry_window_open();

        let result = CheckResult {
            category,
            description: checker.description.clone(),
            retry,
            warning: checker.warning,
            err,
        };

        if observer(&result).is_break() {
            return Err(RunError::Halted { category });
        }

        if !retry {
            return Ok(result.passed());
        }

        if let Some(err) = &result.err {
            debug!(
                "{} failed ({}); retrying in {:?}",
                checker.description, err, state.options.retry_interval
            );
        }
        sleep(state.options.retry_interval).await;
    }
}

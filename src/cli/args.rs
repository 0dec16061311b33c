use clap::{Args, Parser, Subcommand};

use crate::config::{ConnectionSettings, DEFAULT_CONTROL_PLANE_NAMESPACE, DEFAULT_NAMESPACE};

/// vizgate - talk to the Linkerd viz API once the cluster checks out
#[derive(Parser)]
#[command(name = "vizgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Namespace the viz extension is installed into
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Namespace of the Linkerd control plane
    #[arg(long, global = true, default_value = DEFAULT_CONTROL_PLANE_NAMESPACE)]
    pub control_plane_namespace: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Kubernetes API server URL
    #[arg(long, global = true, env = "VIZGATE_API_SERVER")]
    pub api_server: Option<String>,

    /// Bearer token for the API server
    #[arg(long, global = true, env = "VIZGATE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Reach the metrics API directly instead of through the service proxy
    #[arg(long, global = true, env = "VIZGATE_METRICS_API_URL")]
    pub metrics_api_url: Option<String>,

    /// Directory holding config.json. Defaults to ~/.vizgate
    #[arg(long, global = true)]
    pub config_dir: Option<String>,
}

impl From<ConnectionArgs> for ConnectionSettings {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            api_server: args.api_server,
            token: args.token,
            metrics_api_url: args.metrics_api_url,
            config_dir: args.config_dir,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the viz extension for potential problems
    Check {
        /// Wait up to this many seconds for the extension to become available
        #[arg(long, default_value_t = 300)]
        wait: u64,

        /// Also check the control plane API
        #[arg(long)]
        api_checks: bool,
    },
    /// Print the metrics API version
    Version {
        /// Wait up to this many seconds for the extension (0 disables retries)
        #[arg(long, default_value_t = 0)]
        wait: u64,

        /// Skip the health checks and query the metrics API directly
        #[arg(long, conflicts_with = "wait")]
        skip_checks: bool,
    },
    /// List meshed pods known to the metrics API
    Pods {
        /// Only list pods in this namespace
        #[arg(long = "in")]
        in_namespace: Option<String>,

        /// Wait up to this many seconds for the extension (0 disables retries)
        #[arg(long, default_value_t = 0)]
        wait: u64,
    },
}

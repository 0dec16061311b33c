use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod cli;
mod command;
mod config;
mod guard;
mod healthcheck;
mod kube;

use api::ExternalClientFactory;
use cli::{Cli, Commands};
use guard::Guard;
use healthcheck::HealthCheckOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut options = HealthCheckOptions::new(cli.namespace, cli.connection.into());
    options.control_plane_namespace = cli.control_plane_namespace;
    debug!("Viz namespace: {}", options.namespace);

    let guard = Guard::new(Arc::new(ExternalClientFactory));

    match cli.command {
        Commands::Check { wait, api_checks } => {
            command::run_check(options, wait, api_checks).await?;
        }
        Commands::Version { wait, skip_checks } => {
            let options = options.with_wait(Duration::from_secs(wait));
            command::run_version(&guard, options, skip_checks).await?;
        }
        Commands::Pods { in_namespace, wait } => {
            let options = options.with_wait(Duration::from_secs(wait));
            command::run_pods(&guard, options, in_namespace).await?;
        }
    }

    Ok(())
}

use anyhow::{Context, Result};

use crate::api::ExternalClientFactory;
use crate::guard::{self, Guard};
use crate::healthcheck::HealthCheckOptions;

pub async fn run_version(
    guard: &Guard,
    options: HealthCheckOptions,
    skip_checks: bool,
) -> Result<()> {
    let client = if skip_checks {
        guard::raw_client(
            &ExternalClientFactory,
            &options.namespace,
            &options.connection,
        )
        .await?
    } else if options.retry_deadline.is_some() {
        guard.check_client_or_retry_or_exit(options, false).await
    } else {
        guard.check_client_or_exit(options).await
    };

    let version = client
        .version()
        .await
        .context("Failed to fetch metrics API version")?;

    println!("Client version: {}", env!("CARGO_PKG_VERSION"));
    println!("Server version: {}", version.release_version);
    Ok(())
}

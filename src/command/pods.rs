use anyhow::{Context, Result};

use crate::guard::Guard;
use crate::healthcheck::HealthCheckOptions;

pub async fn run_pods(
    guard: &Guard,
    options: HealthCheckOptions,
    namespace: Option<String>,
) -> Result<()> {
    let client = guard.check_client_or_retry_or_exit(options, true).await;

    let response = client
        .list_pods(namespace.as_deref())
        .await
        .context("Failed to list pods")?;

    if response.pods.is_empty() {
        println!("No pods found.");
        return Ok(());
    }

    let width = response
        .pods
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!("{:<width$}  {:<10}  MESHED", "NAME", "STATUS", width = width);
    for pod in &response.pods {
        println!(
            "{:<width$}  {:<10}  {}",
            pod.name,
            pod.status,
            if pod.added { "yes" } else { "no" },
            width = width
        );
    }

    Ok(())
}

use anyhow::Result;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crate::api::ExternalClientFactory;
use crate::guard::{check_plan, AcquireMode};
use crate::healthcheck::{
    CheckCategory, CheckResult, HealthCheckOptions, HealthChecker, StandardCatalog,
};

const OK: &str = "√";
const WARN: &str = "‼";
const FAIL: &str = "×";

/// Prints every result, grouped under a header per category.
struct Reporter {
    current: Option<CheckCategory>,
    waiting: bool,
}

impl Reporter {
    fn new() -> Self {
        Self {
            current: None,
            waiting: false,
        }
    }

    fn observe(&mut self, result: &CheckResult) -> ControlFlow<()> {
        if self.current != Some(result.category) {
            if self.current.is_some() {
                println!();
            }
            let header = result.category.as_str();
            println!("{}\n{}", header, "-".repeat(header.len()));
            self.current = Some(result.category);
        }

        if result.retry {
            if !self.waiting {
                eprintln!(
                    "... {} (waiting for it to become available)",
                    result.description
                );
                self.waiting = true;
            }
            return ControlFlow::Continue(());
        }
        self.waiting = false;

        println!("{} {}", glyph(result), result.description);
        if let Some(err) = &result.err {
            println!("    {}", err);
        }
        ControlFlow::Continue(())
    }
}

fn glyph(result: &CheckResult) -> &'static str {
    match &result.err {
        None => OK,
        Some(_) if result.warning => WARN,
        Some(_) => FAIL,
    }
}

pub async fn run_check(options: HealthCheckOptions, wait: u64, api_checks: bool) -> Result<()> {
    let options = options.with_wait(Duration::from_secs(wait));
    let plan = check_plan(AcquireMode::Flexible { api_checks });

    let mut reporter = Reporter::new();
    let checker = HealthChecker::new(
        &StandardCatalog,
        &plan,
        options,
        Arc::new(ExternalClientFactory),
    );
    let result = checker.run_checks(|result| reporter.observe(result)).await;

    println!();
    match result {
        Ok(outcome) if outcome.warnings > 0 => {
            println!("Status check results are {}", WARN);
            Ok(())
        }
        Ok(_) => {
            println!("Status check results are {}", OK);
            Ok(())
        }
        Err(err) => {
            println!("Status check results are {}", FAIL);
            Err(err.into())
        }
    }
}

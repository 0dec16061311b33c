//! Classifies check results and terminates the process on hard failures.

use std::io::{self, Write};
use std::ops::ControlFlow;

use crate::healthcheck::{CheckCategory, CheckResult};

/// Printed every time a retryable check is waiting
pub const RETRY_NOTICE: &str = "Waiting for control plane to become available";

/// Command users are pointed at after a failure
pub const CHECK_CMD: &str = "linkerd viz check";

/// Diagnostic label for a hard failure in `category`
pub fn category_label(category: CheckCategory) -> &'static str {
    match category {
        CheckCategory::KubernetesApi => "Cannot connect to Kubernetes",
        CheckCategory::LinkerdViz => "Cannot connect to Linkerd Viz",
        _ => "",
    }
}

/// What happens to the process after a hard failure has been reported
pub trait Terminal {
    fn terminate(&mut self, code: i32);
}

/// Exits the process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminal;

impl Terminal for ProcessTerminal {
    fn terminate(&mut self, code: i32) {
        std::process::exit(code);
    }
}

/// Observer that lets retries and warnings through and stops at the first
/// hard failure.
pub struct ExitPolicy<W: Write, T: Terminal> {
    out: W,
    terminal: T,
}

impl ExitPolicy<io::Stderr, ProcessTerminal> {
    pub fn stderr() -> Self {
        Self::new(io::stderr(), ProcessTerminal)
    }
}

impl<W: Write, T: Terminal> ExitPolicy<W, T> {
    pub fn new(out: W, terminal: T) -> Self {
        Self { out, terminal }
    }

    pub fn observe(&mut self, result: &CheckResult) -> ControlFlow<()> {
        if result.retry {
            let _ = writeln!(self.out, "{}", RETRY_NOTICE);
            return ControlFlow::Continue(());
        }

        match &result.err {
            Some(err) if result.is_hard_failure() => {
                let _ = writeln!(self.out, "{}: {}", category_label(result.category), err);
                let _ = writeln!(self.out, "Validate the install with: {}", CHECK_CMD);
                let _ = self.out.flush();
                self.terminal.terminate(1);
                ControlFlow::Break(())
            }
            _ => ControlFlow::Continue(()),
        }
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (W, T) {
        (self.out, self.terminal)
    }
}

//! Automation resource reset.
//!
//! Runs between stake calculation and placement: every adapter involved in
//! the opportunity releases its session, then an optional external command
//! (e.g. killing leftover browser processes) runs, then a short settle
//! delay. Everything here is best effort; failures are logged only.

use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::bookmakers::AdapterRegistry;
use crate::types::Opportunity;

pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ResetConfig {
    /// Program and arguments; empty means no command.
    pub command: Vec<String>,
    /// Bounds each session release and the command.
    pub timeout: Duration,
    pub settle_delay: Duration,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout: DEFAULT_RESET_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

pub struct ResourceReset {
    config: ResetConfig,
}

impl ResourceReset {
    pub fn new(config: ResetConfig) -> Self {
        Self { config }
    }

    /// Release resources, then wait out the settle delay before placement.
    pub async fn run(&self, registry: &AdapterRegistry, opportunity: &Opportunity) {
        self.release(registry, opportunity).await;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }

    /// Release resources held for `opportunity`'s bookmakers.
    pub async fn release(&self, registry: &AdapterRegistry, opportunity: &Opportunity) {
        for leg in &opportunity.legs {
            let Some(entry) = registry.get(&leg.bookmaker) else {
                continue;
            };
            match tokio::time::timeout(self.config.timeout, entry.adapter.release_session()).await {
                Ok(Ok(())) => debug!(bookmaker = %entry.id, "Session released"),
                Ok(Err(e)) => warn!(bookmaker = %entry.id, error = %e, "Session release failed"),
                Err(_) => warn!(bookmaker = %entry.id, "Session release timed out"),
            }
        }

        self.run_command().await;
    }

    async fn run_command(&self) {
        let Some((program, args)) = self.config.command.split_first() else {
            return;
        };

        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);

        match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                info!(program = %program, "Reset command completed");
            }
            Ok(Ok(output)) => {
                // Non-zero is normal when there was nothing to kill.
                debug!(
                    program = %program,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Reset command exited non-zero"
                );
            }
            Ok(Err(e)) => warn!(program = %program, error = %e, "Reset command failed to start"),
            Err(_) => warn!(program = %program, "Reset command timed out"),
        }
    }
}

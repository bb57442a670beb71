//! Scraper trigger.
//!
//! The scraper is an external process that refreshes the opportunity file.
//! Only its exit status is observed; a failure is a warning for the caller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

#[async_trait]
pub trait ScraperTrigger: Send + Sync {
    /// Run one scrape to completion.
    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
}

/// Runs the scraper as a child process.
pub struct CommandScraper {
    config: ScraperConfig,
}

impl CommandScraper {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScraperTrigger for CommandScraper {
    async fn run(&self) -> Result<()> {
        let cfg = &self.config;
        let mut cmd = Command::new(&cfg.program);
        cmd.args(&cfg.args).kill_on_drop(true);
        if let Some(ref dir) = cfg.workdir {
            cmd.current_dir(dir);
        }

        info!(program = %cfg.program, args = ?cfg.args, "Running opportunity scraper");

        let status = tokio::time::timeout(cfg.timeout, cmd.status())
            .await
            .with_context(|| format!("Scraper timed out after {:?}", cfg.timeout))?
            .with_context(|| format!("Failed to start scraper {}", cfg.program))?;

        if !status.success() {
            anyhow::bail!("Scraper exited with {status}");
        }
        info!("Scraper finished");
        Ok(())
    }
}

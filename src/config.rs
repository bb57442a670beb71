//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (bookmaker passwords, bridge tokens) are referenced by env-var
//! name in the config and resolved at startup via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::currency::{api, DEFAULT_EXOTIC};
use crate::engine::cleanup::{ResetConfig, DEFAULT_RESET_TIMEOUT, DEFAULT_SETTLE_DELAY};
use crate::engine::executor::ExecutionConfig;
use crate::engine::scheduler::SchedulerConfig;
use crate::engine::scraper::ScraperConfig;

/// Minimum number of enabled bookmakers needed to form a pair.
pub const MIN_BOOKMAKERS: usize = 2;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub currency: CurrencySection,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub bookmakers: BTreeMap<String, BookmakerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Currency stakes are computed in.
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,
    /// Start the scheduler loop as soon as the process is up.
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionSection {
    /// Maximum total stake per opportunity, in the reference currency.
    pub max_exposure: Decimal,
    /// Smallest per-leg stake worth placing, in the reference currency.
    pub min_stake: Decimal,
    pub balance_timeout_secs: u64,
    pub placement_timeout_secs: u64,
    /// Optional command that force-releases automation resources.
    pub reset_command: Vec<String>,
    pub reset_timeout_secs: u64,
    /// Pause after the reset before the first placement.
    pub settle_delay_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_exposure: dec!(30),
            min_stake: dec!(1),
            balance_timeout_secs: 120,
            placement_timeout_secs: 300,
            reset_command: Vec::new(),
            reset_timeout_secs: DEFAULT_RESET_TIMEOUT.as_secs(),
            settle_delay_secs: DEFAULT_SETTLE_DELAY.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerSection {
    pub max_opportunities_per_cycle: usize,
    pub idle_wait_secs: u64,
    pub opportunity_delay_secs: u64,
    pub opportunities_file: PathBuf,
    pub audit_log: PathBuf,
    /// Scraper command line; empty disables the scraper trigger.
    pub scraper_command: Vec<String>,
    pub scraper_workdir: Option<PathBuf>,
    pub scraper_timeout_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_opportunities_per_cycle: 3,
            idle_wait_secs: 300,
            opportunity_delay_secs: 10,
            opportunities_file: PathBuf::from("filtered_opportunities.json"),
            audit_log: PathBuf::from(crate::storage::DEFAULT_AUDIT_FILE),
            scraper_command: Vec::new(),
            scraper_workdir: None,
            scraper_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CurrencySection {
    pub api_base_url: String,
    pub api_timeout_secs: u64,
    pub exotic: Vec<String>,
    /// Units per EUR, merged over the embedded table.
    pub offline_rates: HashMap<String, Decimal>,
}

impl Default for CurrencySection {
    fn default() -> Self {
        Self {
            api_base_url: api::DEFAULT_BASE_URL.to_string(),
            api_timeout_secs: api::DEFAULT_TIMEOUT.as_secs(),
            exotic: DEFAULT_EXOTIC.iter().map(|c| c.to_string()).collect(),
            offline_rates: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    /// Env var holding the bearer token for the POST actions.
    pub token_env: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 8787,
            token_env: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Remote,
    Paper,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookmakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub adapter: AdapterKind,
    /// Bridge base URL (remote adapter).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub username_env: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    /// Bearer token for the bridge (remote adapter).
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Starting balance (paper adapter).
    #[serde(default)]
    pub paper_balance: Option<Decimal>,
    #[serde(default)]
    pub paper_currency: Option<String>,
}

fn default_reference_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Enabled bookmakers, sorted by identifier.
    pub fn enabled_bookmakers(&self) -> impl Iterator<Item = (&String, &BookmakerConfig)> {
        self.bookmakers.iter().filter(|(_, b)| b.enabled)
    }

    pub fn validate(&self) -> Result<()> {
        let enabled = self.enabled_bookmakers().count();
        if enabled < MIN_BOOKMAKERS {
            anyhow::bail!(
                "At least {MIN_BOOKMAKERS} enabled bookmakers are required, found {enabled}"
            );
        }
        for (id, book) in self.enabled_bookmakers() {
            if book.adapter == AdapterKind::Remote
                && book.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
            {
                anyhow::bail!("Bookmaker {id}: remote adapter needs an endpoint");
            }
        }
        if self.execution.max_exposure <= Decimal::ZERO {
            anyhow::bail!("execution.max_exposure must be positive");
        }
        if self.execution.min_stake < Decimal::ZERO {
            anyhow::bail!("execution.min_stake must not be negative");
        }
        if self.scheduler.max_opportunities_per_cycle == 0 {
            anyhow::bail!("scheduler.max_opportunities_per_cycle must be at least 1");
        }
        if self.agent.reference_currency.trim().is_empty() {
            anyhow::bail!("agent.reference_currency must not be empty");
        }
        Ok(())
    }

    // -- Runtime configs ---------------------------------------------------

    pub fn execution_config(&self) -> ExecutionConfig {
        let e = &self.execution;
        ExecutionConfig {
            reference_currency: self.agent.reference_currency.trim().to_uppercase(),
            max_exposure: e.max_exposure,
            min_stake: e.min_stake,
            balance_timeout: Duration::from_secs(e.balance_timeout_secs),
            placement_timeout: Duration::from_secs(e.placement_timeout_secs),
        }
    }

    pub fn reset_config(&self) -> ResetConfig {
        let e = &self.execution;
        ResetConfig {
            command: e.reset_command.clone(),
            timeout: Duration::from_secs(e.reset_timeout_secs),
            settle_delay: Duration::from_secs(e.settle_delay_secs),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let s = &self.scheduler;
        SchedulerConfig {
            max_opportunities_per_cycle: s.max_opportunities_per_cycle,
            idle_wait: Duration::from_secs(s.idle_wait_secs),
            opportunity_delay: Duration::from_secs(s.opportunity_delay_secs),
            opportunities_file: s.opportunities_file.clone(),
            tick: Duration::from_secs(1),
        }
    }

    /// Control API token, if `control.token_env` names one.
    pub fn control_token(&self) -> Result<Option<SecretString>> {
        self.control
            .token_env
            .as_deref()
            .map(Self::resolve_env)
            .transpose()
            .map(|token| token.map(SecretString::new))
    }

    pub fn scraper_config(&self) -> Option<ScraperConfig> {
        let s = &self.scheduler;
        let (program, args) = s.scraper_command.split_first()?;
        Some(ScraperConfig {
            program: program.clone(),
            args: args.to_vec(),
            workdir: s.scraper_workdir.clone(),
            timeout: Duration::from_secs(s.scraper_timeout_secs),
        })
    }
}

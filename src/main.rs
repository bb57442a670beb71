//! SUREBET: two-leg sports arbitrage execution engine
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the bookmaker adapters, converter and executor into the scheduler, serves
//! the control API, and shuts down gracefully on Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use surebet::bookmakers::AdapterRegistry;
use surebet::config;
use surebet::control;
use surebet::currency::{CurrencyConverter, ExchangeRateApiClient, OfflineRates};
use surebet::engine::cleanup::ResourceReset;
use surebet::engine::executor::ArbitrageExecutor;
use surebet::engine::scheduler::Scheduler;
use surebet::engine::scraper::{CommandScraper, ScraperTrigger};
use surebet::storage::AuditLog;

const BANNER: &str = r#"
 ____  _   _ ____  _____ ____  _____ _____
/ ___|| | | |  _ \| ____| __ )| ____|_   _|
\___ \| | | | |_) |  _| |  _ \|  _|   | |
 ___) | |_| |  _ <| |___| |_) | |___  | |
|____/ \___/|_| \_\_____|____/|_____| |_|

  Two-leg arbitrage execution engine
  v0.1.0
"#;

const DEFAULT_CONFIG: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        config = %config_path,
        reference_currency = %cfg.agent.reference_currency,
        max_exposure = %cfg.execution.max_exposure,
        "SUREBET starting up"
    );

    // -- Initialise components -------------------------------------------

    let registry = Arc::new(AdapterRegistry::from_config(&cfg)?);
    info!(bookmakers = ?registry.ids(), "Bookmakers ready");

    let rate_api = ExchangeRateApiClient::new(
        &cfg.currency.api_base_url,
        Duration::from_secs(cfg.currency.api_timeout_secs),
    )?;
    let converter = CurrencyConverter::new(
        OfflineRates::default().with_overrides(&cfg.currency.offline_rates),
        Arc::new(rate_api),
    )
    .with_exotic(cfg.currency.exotic.iter());

    let executor = Arc::new(ArbitrageExecutor::new(
        registry,
        Arc::new(converter),
        ResourceReset::new(cfg.reset_config()),
        cfg.execution_config(),
    ));

    let scraper: Option<Arc<dyn ScraperTrigger>> = match cfg.scraper_config() {
        Some(sc) => Some(Arc::new(CommandScraper::new(sc))),
        None => {
            warn!("No scraper command configured, using the opportunity file as-is");
            None
        }
    };

    let audit = AuditLog::new(cfg.scheduler.audit_log.clone());
    info!(path = %audit.path().display(), "Audit log");

    let scheduler = Arc::new(Scheduler::new(
        executor,
        scraper,
        Some(audit),
        cfg.scheduler_config(),
    ));

    // -- Control API -----------------------------------------------------

    if cfg.control.enabled {
        let token = cfg.control_token()?;
        control::spawn_control_server(
            scheduler.clone(),
            &cfg.control.bind,
            cfg.control.port,
            token,
        )
        .await
        .context("Control API failed to start")?;
    } else {
        info!("Control API disabled");
    }

    if cfg.agent.autostart {
        if let Err(e) = scheduler.start().await {
            error!(error = %e, "Autostart failed");
        }
    } else {
        info!("Scheduler idle. POST /api/start to begin.");
    }

    // -- Wait for shutdown -----------------------------------------------

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    if scheduler.stop().is_ok() {
        info!("Waiting for the current cycle to finish");
    }
    scheduler.join().await;

    let status = scheduler.status().await;
    info!(
        cycles = status.cycles_completed,
        attempted = status.totals.attempted,
        succeeded = status.totals.succeeded,
        failed = status.totals.failed,
        one_sided = status.totals.one_sided,
        "SUREBET shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("surebet=info"));

    let json_logging = std::env::var("SUREBET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

//! Mock bookmaker for integration testing.
//!
//! Provides a deterministic `BookmakerAdapter` whose balance, login state
//! and placement behaviour are controlled from test code. Every call is
//! recorded so tests can assert what the engine asked for.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use surebet::bookmakers::{AdapterRegistry, BookmakerAdapter, Credentials};
use surebet::currency::{CurrencyConverter, OfflineRates, RateApi};
use surebet::engine::cleanup::{ResetConfig, ResourceReset};
use surebet::engine::executor::{ArbitrageExecutor, ExecutionConfig};
use surebet::types::*;

/// How `place_bet` responds.
#[derive(Debug, Clone)]
pub enum Placement {
    /// Placed and confirmed from the bet slip.
    Confirm,
    /// Placed, but no read-back confirmation.
    Unverified,
    /// Bookmaker refused the bet.
    Reject(String),
    /// The adapter itself failed.
    Error(String),
    /// Never returns.
    Hang,
    /// The adapter panics mid-placement.
    Panic(String),
}

/// A mock bookmaker account.
pub struct MockBookmaker {
    name: String,
    currency: String,
    balance: Mutex<Decimal>,
    logged_in: Mutex<bool>,
    balance_error: Mutex<Option<String>>,
    placement: Mutex<Placement>,
    placed: Mutex<Vec<LegBetRequest>>,
    balance_checks: AtomicUsize,
    releases: AtomicUsize,
}

impl MockBookmaker {
    pub fn new(name: &str, balance: Decimal, currency: &str) -> Self {
        Self {
            name: name.to_string(),
            currency: currency.to_string(),
            balance: Mutex::new(balance),
            logged_in: Mutex::new(true),
            balance_error: Mutex::new(None),
            placement: Mutex::new(Placement::Confirm),
            placed: Mutex::new(Vec::new()),
            balance_checks: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        *self.logged_in.lock().unwrap() = logged_in;
    }

    /// Make every balance check fail with `msg`.
    pub fn set_balance_error(&self, msg: &str) {
        *self.balance_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn set_placement(&self, placement: Placement) {
        *self.placement.lock().unwrap() = placement;
    }

    pub fn balance(&self) -> Decimal {
        *self.balance.lock().unwrap()
    }

    /// Requests that reached `place_bet`, in order.
    pub fn placed(&self) -> Vec<LegBetRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn balance_checks(&self) -> usize {
        self.balance_checks.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookmakerAdapter for MockBookmaker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_balance(&self, _credentials: &Credentials) -> Result<BalanceReading> {
        self.balance_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.balance_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        if !*self.logged_in.lock().unwrap() {
            return Ok(BalanceReading::failed(&self.name, "login form still visible"));
        }
        Ok(BalanceReading::logged_in(&self.name, self.balance(), &self.currency))
    }

    async fn place_bet(&self, request: &LegBetRequest) -> Result<LegOutcome> {
        self.placed.lock().unwrap().push(request.clone());
        let placement = self.placement.lock().unwrap().clone();

        match placement {
            Placement::Confirm | Placement::Unverified => {
                *self.balance.lock().unwrap() -= request.stake;
                let reference = Some(format!("{}-{}", self.name, self.placed().len()));
                if matches!(placement, Placement::Confirm) {
                    Ok(LegOutcome::confirmed(request, reference))
                } else {
                    Ok(LegOutcome::unverified(request, reference))
                }
            }
            Placement::Reject(reason) => Ok(LegOutcome::rejected(request, reason)),
            Placement::Error(msg) => Err(anyhow!(msg)),
            Placement::Hang => std::future::pending().await,
            Placement::Panic(msg) => panic!("{msg}"),
        }
    }

    async fn release_session(&self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Fixed network rate tables keyed by base currency.
#[derive(Default)]
pub struct StaticRates {
    tables: HashMap<String, HashMap<String, Decimal>>,
    calls: AtomicUsize,
}

impl StaticRates {
    pub fn with_table(mut self, base: &str, rates: &[(&str, Decimal)]) -> Self {
        let table = rates.iter().map(|(c, r)| (c.to_string(), *r)).collect();
        self.tables.insert(base.to_string(), table);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateApi for StaticRates {
    async fn latest_rates(&self, base: &str) -> Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables
            .get(base)
            .cloned()
            .ok_or_else(|| anyhow!("no rate table for {base}"))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Two-leg opportunity on `nairabet` (leg 1) and `leon` (leg 2).
pub fn opportunity(odd1: Decimal, odd2: Decimal) -> Opportunity {
    let leg = |bookmaker: &str, bet_type: &str, odd: Decimal| Leg {
        bookmaker: bookmaker.to_string(),
        team1: "Rakuten Monkeys".to_string(),
        team2: "Fubon Guardians".to_string(),
        league: "CPBL".to_string(),
        bet_type: bet_type.to_string(),
        odd,
        link: format!("https://{bookmaker}.example/event/42"),
    };
    Opportunity {
        profit_percent: dec!(0.48),
        sport: "Baseball".to_string(),
        event_time: "Jul 04, 10:35".to_string(),
        legs: [leg("nairabet", "DNB1", odd1), leg("leon", "DNB2", odd2)],
    }
}

pub fn registry(nairabet: Arc<MockBookmaker>, leon: Arc<MockBookmaker>) -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    registry.register("nairabet", nairabet, Credentials::new("punter", "secret"));
    registry.register("leon", leon, Credentials::new("punter", "secret"));
    Arc::new(registry)
}

pub fn executor_with(
    nairabet: Arc<MockBookmaker>,
    leon: Arc<MockBookmaker>,
    rates: Arc<StaticRates>,
    config: ExecutionConfig,
) -> ArbitrageExecutor {
    ArbitrageExecutor::new(
        registry(nairabet, leon),
        Arc::new(CurrencyConverter::new(OfflineRates::default(), rates)),
        ResourceReset::new(ResetConfig {
            command: Vec::new(),
            timeout: Duration::from_secs(1),
            settle_delay: Duration::ZERO,
        }),
        config,
    )
}

/// Executor over two USD accounts with default limits.
pub fn executor(nairabet: Arc<MockBookmaker>, leon: Arc<MockBookmaker>) -> ArbitrageExecutor {
    executor_with(
        nairabet,
        leon,
        Arc::new(StaticRates::default()),
        ExecutionConfig::default(),
    )
}

pub fn usd_account(name: &str, balance: Decimal) -> Arc<MockBookmaker> {
    Arc::new(MockBookmaker::new(name, balance, "USD"))
}

/// Unique path under the system temp dir.
pub fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{prefix}_{}.{ext}", uuid::Uuid::new_v4()))
}

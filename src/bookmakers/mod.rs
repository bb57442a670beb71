//! Bookmaker integrations.
//!
//! Defines the `BookmakerAdapter` trait and the registry the engine uses to
//! find the adapter for a leg. Shipped implementations:
//! - `remote`: HTTP/JSON bridge to an external browser-automation agent
//! - `paper`: dry-run adapter with a fixed balance

pub mod paper;
pub mod remote;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::config::{AdapterKind, AppConfig, BookmakerConfig};
use crate::types::{ArbError, BalanceReading, LegBetRequest, LegOutcome};

/// Paper balance when the config gives none.
pub const DEFAULT_PAPER_BALANCE: Decimal = dec!(100);

/// Account login for one bookmaker.
pub struct Credentials {
    pub username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// No credentials (paper accounts, agents that hold their own session).
    pub fn anonymous() -> Self {
        Self::new(String::new(), String::new())
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Abstraction over one counterparty account.
///
/// Implementors read the account balance and place a single bet. The engine
/// never inspects how they do it (browser automation, HTTP, paper).
#[async_trait]
pub trait BookmakerAdapter: Send + Sync {
    /// Identifier for logging.
    fn name(&self) -> &str;

    /// Log in if needed and read the current balance.
    async fn check_balance(&self, credentials: &Credentials) -> Result<BalanceReading>;

    /// Place one leg. A rejected bet is `Ok` with `placed == false`;
    /// `Err` means the adapter itself failed.
    async fn place_bet(&self, request: &LegBetRequest) -> Result<LegOutcome>;

    /// Release automation resources (browser sessions, profile locks).
    async fn release_session(&self) -> Result<()> {
        Ok(())
    }
}

/// An adapter plus the credentials it runs with.
pub struct RegisteredBookmaker {
    pub id: String,
    pub adapter: Arc<dyn BookmakerAdapter>,
    pub credentials: Credentials,
}

/// Adapters keyed by lower-case bookmaker identifier.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: HashMap<String, Arc<RegisteredBookmaker>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_id(id: &str) -> String {
        id.trim().to_lowercase()
    }

    /// Register (or replace) the adapter for `id`.
    pub fn register(
        &mut self,
        id: &str,
        adapter: Arc<dyn BookmakerAdapter>,
        credentials: Credentials,
    ) {
        let id = Self::normalize_id(id);
        self.entries.insert(
            id.clone(),
            Arc::new(RegisteredBookmaker {
                id,
                adapter,
                credentials,
            }),
        );
    }

    pub fn get(&self, id: &str) -> Option<Arc<RegisteredBookmaker>> {
        self.entries.get(&Self::normalize_id(id)).cloned()
    }

    /// Like `get`, but an unregistered bookmaker is an error.
    pub fn require(&self, id: &str) -> std::result::Result<Arc<RegisteredBookmaker>, ArbError> {
        self.get(id)
            .ok_or_else(|| ArbError::UnknownBookmaker(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&Self::normalize_id(id))
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build adapters for every enabled bookmaker in the config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut registry = Self::new();
        for (id, book) in config.enabled_bookmakers() {
            let (adapter, credentials) = build_adapter(id, book, &config.agent.reference_currency)
                .with_context(|| format!("Failed to set up bookmaker {id}"))?;
            info!(bookmaker = %id, adapter = ?book.adapter, "Bookmaker registered");
            registry.register(id, adapter, credentials);
        }
        Ok(registry)
    }
}

fn build_adapter(
    id: &str,
    book: &BookmakerConfig,
    reference_currency: &str,
) -> Result<(Arc<dyn BookmakerAdapter>, Credentials)> {
    match book.adapter {
        AdapterKind::Paper => {
            let adapter = paper::PaperAdapter::new(
                id,
                book.paper_balance.unwrap_or(DEFAULT_PAPER_BALANCE),
                book.paper_currency.as_deref().unwrap_or(reference_currency),
            );
            Ok((Arc::new(adapter), Credentials::anonymous()))
        }
        AdapterKind::Remote => {
            let endpoint = book
                .endpoint
                .as_deref()
                .context("Remote adapter needs an endpoint")?;
            let token = book
                .token_env
                .as_deref()
                .map(AppConfig::resolve_env)
                .transpose()?
                .map(SecretString::new);
            let adapter = remote::RemoteAdapter::new(
                id,
                endpoint,
                Duration::from_secs(book.request_timeout_secs),
                token,
            )?;
            Ok((Arc::new(adapter), credentials_from_env(book)?))
        }
    }
}

/// Credentials named by `username_env`/`password_env`; anonymous if neither is set.
fn credentials_from_env(book: &BookmakerConfig) -> Result<Credentials> {
    if book.username_env.is_none() && book.password_env.is_none() {
        return Ok(Credentials::anonymous());
    }
    let username = book
        .username_env
        .as_deref()
        .map(AppConfig::resolve_env)
        .transpose()?
        .unwrap_or_default();
    let password = book
        .password_env
        .as_deref()
        .map(AppConfig::resolve_env)
        .transpose()?
        .unwrap_or_default();
    Ok(Credentials::new(username, password))
}

/// Parse a balance as bookmaker pages display it (`"₦ 12,500.00"`,
/// `"1.234,56 €"`, `"USD 30"`). Unparseable text is zero.
pub fn parse_amount(text: &str) -> Decimal {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() {
        return Decimal::ZERO;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalized = match (last_dot, last_comma) {
        // Both present: whichever comes last is the decimal separator.
        (Some(d), Some(c)) if d > c => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        // Only commas: "12,50" is decimal, "12,500" and "1,250,000" are grouping.
        (None, Some(c)) => {
            let decimals = cleaned.len() - c - 1;
            if cleaned.matches(',').count() == 1 && decimals != 3 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        // Only dots: several of them means grouping ("1.250.000").
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Remote automation bridge.
//!
//! Forwards balance checks and bet placement to an external agent that
//! drives the bookmaker website (browser automation lives there, not here).
//!
//! Endpoints, relative to the configured base URL:
//! - `POST {base}/balance`        `{ bookmaker, username, password }`
//! - `POST {base}/bets`           a `LegBetRequest`
//! - `POST {base}/session/close`  `{ bookmaker }`
//!
//! Auth: optional `Authorization: Bearer {token}`.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{parse_amount, BookmakerAdapter, Credentials};
use crate::types::{BalanceReading, LegBetRequest, LegOutcome, FALLBACK_CURRENCY};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct BalanceQuery<'a> {
    bookmaker: &'a str,
    username: &'a str,
    password: &'a str,
}

/// Balance as the agent scraped it. `balance` may be a number or display text.
#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    is_logged_in: bool,
    #[serde(default)]
    balance: Value,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, alias = "error")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlacementResponse {
    #[serde(default)]
    bet_placed: bool,
    /// The agent read the bet back from the slip or bet history.
    #[serde(default)]
    verification_completed: bool,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default, alias = "error_message")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionClose<'a> {
    bookmaker: &'a str,
}

fn amount_from_value(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .unwrap_or(Decimal::ZERO)
        }
        Value::String(s) => parse_amount(s),
        _ => Decimal::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RemoteAdapter {
    name: String,
    http: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl RemoteAdapter {
    pub fn new(
        name: &str,
        base_url: &str,
        timeout: Duration,
        token: Option<SecretString>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SUREBET/0.1.0")
            .build()
            .with_context(|| format!("Failed to build HTTP client for {name}"))?;

        Ok(Self {
            name: name.to_string(),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self.http.post(url);
        match self.token {
            Some(ref token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    async fn send<B>(&self, path: &str, body: &B) -> Result<Response>
    where
        B: Serialize + ?Sized + Sync,
    {
        debug!(bookmaker = %self.name, path, "Calling automation bridge");
        let resp = self
            .post(path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{} bridge request {path} failed", self.name))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} bridge error {status}: {body}", self.name);
        }
        Ok(resp)
    }

    async fn send_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: serde::de::DeserializeOwned,
    {
        self.send(path, body)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} bridge response for {path}", self.name))
    }
}

#[async_trait]
impl BookmakerAdapter for RemoteAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_balance(&self, credentials: &Credentials) -> Result<BalanceReading> {
        let query = BalanceQuery {
            bookmaker: &self.name,
            username: &credentials.username,
            password: credentials.password(),
        };
        let resp: BalanceResponse = self.send_json("/balance", &query).await?;

        if !resp.is_logged_in {
            return Ok(BalanceReading::failed(
                &self.name,
                resp.error_message
                    .unwrap_or_else(|| "bridge reports not logged in".to_string()),
            ));
        }

        let currency = resp
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| {
                warn!(bookmaker = %self.name, fallback = FALLBACK_CURRENCY, "Bridge returned no currency");
                FALLBACK_CURRENCY.to_string()
            });

        let mut reading =
            BalanceReading::logged_in(&self.name, amount_from_value(&resp.balance), &currency);
        reading.error = resp.error_message;
        Ok(reading)
    }

    async fn place_bet(&self, request: &LegBetRequest) -> Result<LegOutcome> {
        let resp: PlacementResponse = self.send_json("/bets", request).await?;

        let outcome = match (resp.bet_placed, resp.verification_completed) {
            (true, true) => LegOutcome::confirmed(request, resp.reference),
            (true, false) => LegOutcome::unverified(request, resp.reference),
            (false, _) => LegOutcome::rejected(
                request,
                resp.error
                    .unwrap_or_else(|| "bridge reports bet not placed".to_string()),
            ),
        };
        Ok(outcome)
    }

    async fn release_session(&self) -> Result<()> {
        self.send("/session/close", &SessionClose { bookmaker: &self.name })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

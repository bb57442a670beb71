//! Network exchange-rate API.
//!
//! API docs: https://www.exchangerate-api.com/docs/free
//! Endpoint: `GET {base}/{FROM}` returning `{ "base": "...", "rates": { "USD": 1.0, ... } }`
//! Auth: none.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.exchangerate-api.com/v4/latest";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Source of live exchange rates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateApi: Send + Sync {
    /// Rate table for `base`: units of each currency per one unit of `base`.
    async fn latest_rates(&self, base: &str) -> Result<HashMap<String, Decimal>>;
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    #[serde(default)]
    base: String,
    rates: HashMap<String, Decimal>,
}

/// Client for exchangerate-api.com (or a compatible mirror).
pub struct ExchangeRateApiClient {
    http: Client,
    base_url: String,
}

impl ExchangeRateApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SUREBET/0.1.0")
            .build()
            .context("Failed to build HTTP client for exchange-rate API")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateApi for ExchangeRateApiClient {
    async fn latest_rates(&self, base: &str) -> Result<HashMap<String, Decimal>> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(base));
        debug!(url = %url, "Fetching exchange rates");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Exchange-rate API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Exchange-rate API error {status}: {body}");
        }

        let parsed: LatestRatesResponse = resp
            .json()
            .await
            .context("Failed to parse exchange-rate API response")?;

        debug!(base = %parsed.base, currencies = parsed.rates.len(), "Exchange rates fetched");
        Ok(parsed.rates)
    }
}

//! Currency conversion with an offline table and a network fallback.
//!
//! Same-currency conversions never touch either source. Exotic currencies
//! (poorly covered by reference tables) go straight to the network API;
//! everything else tries the offline table first.

pub mod api;
pub mod offline;

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::types::{round_money, ArbError};
pub use api::{ExchangeRateApiClient, RateApi};
pub use offline::OfflineRates;

/// Currencies routed straight to the network API.
pub const DEFAULT_EXOTIC: &[&str] = &["NGN", "RUB", "TRY", "IRR", "PKR", "BDT", "LKR", "VES", "MMK"];

pub struct CurrencyConverter {
    offline: OfflineRates,
    api: Arc<dyn RateApi>,
    exotic: HashSet<String>,
}

impl CurrencyConverter {
    pub fn new(offline: OfflineRates, api: Arc<dyn RateApi>) -> Self {
        Self {
            offline,
            api,
            exotic: DEFAULT_EXOTIC.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Replace the exotic-currency set.
    pub fn with_exotic<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exotic = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_uppercase())
            .collect();
        self
    }

    pub fn is_exotic(&self, code: &str) -> bool {
        self.exotic.contains(&code.trim().to_uppercase())
    }

    /// Convert `amount` from one currency to another, rounded to cents.
    pub async fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, ArbError> {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();

        if from == to {
            return Ok(amount);
        }

        if self.exotic.contains(&from) || self.exotic.contains(&to) {
            debug!(from = %from, to = %to, "Exotic currency, using network rates");
            return self.convert_network(amount, &from, &to).await;
        }

        match self.offline.convert(amount, &from, &to) {
            Some(converted) => {
                debug!(from = %from, to = %to, amount = %amount, "Converted with offline rates");
                Ok(round_money(converted))
            }
            None => {
                warn!(from = %from, to = %to, "Offline rates missing, falling back to network");
                self.convert_network(amount, &from, &to).await
            }
        }
    }

    async fn convert_network(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal, ArbError> {
        let failure = |message: String| ArbError::Conversion {
            from: from.to_string(),
            to: to.to_string(),
            message,
        };

        let rates = self
            .api
            .latest_rates(from)
            .await
            .map_err(|e| failure(format!("{e:#}")))?;

        let rate = rates
            .get(to)
            .copied()
            .ok_or_else(|| failure(format!("rate for {to} missing from {from} table")))?;

        Ok(round_money(amount * rate))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

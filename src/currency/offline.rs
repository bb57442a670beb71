//! Offline reference-rate table.
//!
//! Rates are quoted per one EUR, the way the ECB publishes them. The
//! embedded table is a snapshot; `[currency.offline_rates]` in the config
//! overrides or extends it.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Base currency of the table.
pub const BASE: &str = "EUR";

/// Embedded ECB-style snapshot (units per EUR).
const SNAPSHOT: &[(&str, Decimal)] = &[
    ("USD", dec!(1.0850)),
    ("GBP", dec!(0.8560)),
    ("JPY", dec!(162.50)),
    ("CHF", dec!(0.9520)),
    ("CAD", dec!(1.4750)),
    ("AUD", dec!(1.6350)),
    ("NZD", dec!(1.7800)),
    ("SEK", dec!(11.450)),
    ("NOK", dec!(11.650)),
    ("DKK", dec!(7.4600)),
    ("PLN", dec!(4.3200)),
    ("CZK", dec!(25.050)),
    ("HUF", dec!(395.00)),
    ("RON", dec!(4.9750)),
    ("BGN", dec!(1.9558)),
    ("ISK", dec!(150.10)),
    ("ZAR", dec!(19.900)),
    ("BRL", dec!(5.9500)),
    ("MXN", dec!(19.450)),
    ("INR", dec!(90.500)),
    ("CNY", dec!(7.8300)),
    ("HKD", dec!(8.4600)),
    ("SGD", dec!(1.4600)),
    ("KRW", dec!(1480.0)),
    ("IDR", dec!(17600)),
    ("MYR", dec!(5.0500)),
    ("PHP", dec!(62.800)),
    ("THB", dec!(39.100)),
    ("ILS", dec!(4.0300)),
];

/// EUR-based rate table used before any network call.
#[derive(Debug, Clone)]
pub struct OfflineRates {
    per_eur: HashMap<String, Decimal>,
}

impl Default for OfflineRates {
    fn default() -> Self {
        let mut per_eur: HashMap<String, Decimal> = SNAPSHOT
            .iter()
            .map(|(code, rate)| (code.to_string(), *rate))
            .collect();
        per_eur.insert(BASE.to_string(), Decimal::ONE);
        Self { per_eur }
    }
}

impl OfflineRates {
    /// An empty table (only EUR), mainly for tests.
    pub fn empty() -> Self {
        let mut per_eur = HashMap::new();
        per_eur.insert(BASE.to_string(), Decimal::ONE);
        Self { per_eur }
    }

    /// Merge `overrides` (units per EUR) into the table. Non-positive rates are ignored.
    pub fn with_overrides(mut self, overrides: &HashMap<String, Decimal>) -> Self {
        for (code, rate) in overrides {
            if *rate > Decimal::ZERO {
                self.per_eur.insert(code.trim().to_uppercase(), *rate);
            }
        }
        self
    }

    pub fn supports(&self, code: &str) -> bool {
        self.per_eur.contains_key(code)
    }

    /// Convert through EUR. Codes must already be upper-case.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Option<Decimal> {
        let from_rate = self.per_eur.get(from)?;
        let to_rate = self.per_eur.get(to)?;
        Some(amount / *from_rate * *to_rate)
    }
}

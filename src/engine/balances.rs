//! Balance aggregator.
//!
//! Reads both legs' balances concurrently. A leg that fails for any reason
//! (unknown bookmaker, adapter error, timeout, logged out) comes back as a
//! zero-balance reading carrying the error; the other leg is unaffected.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bookmakers::AdapterRegistry;
use crate::types::{BalanceReading, LegId, Opportunity};

pub struct BalanceAggregator {
    registry: Arc<AdapterRegistry>,
    timeout: Duration,
}

impl BalanceAggregator {
    pub fn new(registry: Arc<AdapterRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Fetch fresh readings for both legs, in leg order.
    pub async fn fetch(&self, opportunity: &Opportunity) -> [BalanceReading; 2] {
        let (first, second) = tokio::join!(
            self.fetch_leg(opportunity, LegId::First),
            self.fetch_leg(opportunity, LegId::Second),
        );

        info!(
            leg1 = %first,
            leg2 = %second,
            "Balances fetched"
        );
        [first, second]
    }

    async fn fetch_leg(&self, opportunity: &Opportunity, leg: LegId) -> BalanceReading {
        let bookmaker = &opportunity.leg(leg).bookmaker;

        let Some(entry) = self.registry.get(bookmaker) else {
            warn!(bookmaker = %bookmaker, leg = %leg, "No adapter registered");
            return BalanceReading::failed(bookmaker, format!("no adapter registered for {bookmaker}"));
        };

        debug!(bookmaker = %bookmaker, leg = %leg, "Checking balance");
        let result = tokio::time::timeout(
            self.timeout,
            entry.adapter.check_balance(&entry.credentials),
        )
        .await;

        match result {
            Ok(Ok(mut reading)) => {
                reading.bookmaker = entry.id.clone();
                if !reading.is_logged_in {
                    warn!(
                        bookmaker = %bookmaker,
                        error = reading.error.as_deref().unwrap_or("none"),
                        "Bookmaker not logged in"
                    );
                    let error = reading
                        .error
                        .take()
                        .unwrap_or_else(|| "not logged in".to_string());
                    return BalanceReading::failed(&entry.id, error);
                }
                reading
            }
            Ok(Err(e)) => {
                warn!(bookmaker = %bookmaker, error = %e, "Balance check failed");
                BalanceReading::failed(&entry.id, format!("balance check failed: {e:#}"))
            }
            Err(_) => {
                warn!(
                    bookmaker = %bookmaker,
                    timeout_secs = self.timeout.as_secs(),
                    "Balance check timed out"
                );
                BalanceReading::failed(
                    &entry.id,
                    format!("balance check timed out after {:?}", self.timeout),
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

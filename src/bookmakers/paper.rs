//! Paper bookmaker for dry runs.
//!
//! Reports a fixed balance and logs the bet it would place instead of
//! placing it. Placed stakes are tracked so repeated dry runs see the
//! balance go down.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use super::{BookmakerAdapter, Credentials};
use crate::types::{BalanceReading, LegBetRequest, LegOutcome};

pub struct PaperAdapter {
    name: String,
    currency: String,
    balance: Mutex<Decimal>,
}

impl PaperAdapter {
    pub fn new(name: &str, balance: Decimal, currency: &str) -> Self {
        Self {
            name: name.to_string(),
            currency: currency.trim().to_uppercase(),
            balance: Mutex::new(balance),
        }
    }

    pub async fn balance(&self) -> Decimal {
        *self.balance.lock().await
    }
}

#[async_trait]
impl BookmakerAdapter for PaperAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_balance(&self, _credentials: &Credentials) -> Result<BalanceReading> {
        let balance = *self.balance.lock().await;
        Ok(BalanceReading::logged_in(&self.name, balance, &self.currency))
    }

    async fn place_bet(&self, request: &LegBetRequest) -> Result<LegOutcome> {
        let mut balance = self.balance.lock().await;
        if request.stake > *balance {
            return Ok(LegOutcome::rejected(
                request,
                format!("paper balance {:.2} below stake {:.2}", *balance, request.stake),
            ));
        }
        *balance -= request.stake;

        info!(
            bookmaker = %self.name,
            leg = %request.leg,
            bet_type = %request.bet_type,
            odd = %request.odd,
            stake = format!("{:.2} {}", request.stake, request.currency),
            "[DRY RUN] Would place bet"
        );

        let reference = format!("paper-{}", uuid::Uuid::new_v4());
        Ok(LegOutcome::confirmed(request, Some(reference)))
    }
}

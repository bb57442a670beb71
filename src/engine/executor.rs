//! Arbitrage executor.
//!
//! Drives one opportunity through the execution saga:
//!
//! `IDLE → BALANCE_CHECK → FEASIBILITY_GATE → STAKE_CALC → RESOURCE_RESET →
//! LEG1_PLACE → LEG2_PLACE → DONE`
//!
//! Any failure before placement aborts the opportunity with nothing placed.
//! Once placement starts both legs are always attempted, and each leg's
//! failure is recorded as its own outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::balances::BalanceAggregator;
use super::cleanup::ResourceReset;
use crate::bookmakers::AdapterRegistry;
use crate::currency::CurrencyConverter;
use crate::storage::opportunities::validate;
use crate::strategy::stake::{budget_allocation, implied_probabilities, known_stake_allocation, KnownStake};
use crate::types::{
    ArbError, BalanceReading, CycleResult, CycleStatus, LegBetRequest, LegId, LegOutcome,
    Opportunity, Phase, StakeAllocation,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Currency the stake split is computed in.
    pub reference_currency: String,
    /// Maximum total stake per opportunity, in the reference currency.
    pub max_exposure: Decimal,
    /// Smallest per-leg stake worth placing, in the reference currency.
    pub min_stake: Decimal,
    pub balance_timeout: Duration,
    pub placement_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            reference_currency: "USD".to_string(),
            max_exposure: dec!(30),
            min_stake: dec!(1),
            balance_timeout: Duration::from_secs(120),
            placement_timeout: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// Saga bookkeeping
// ---------------------------------------------------------------------------

/// Accumulates what one run has produced so far.
struct SagaRun<'a> {
    id: Uuid,
    opportunity: &'a Opportunity,
    phase: Phase,
    started_at: chrono::DateTime<Utc>,
    balances: Option<[BalanceReading; 2]>,
    allocation: Option<StakeAllocation>,
    requests: Option<[LegBetRequest; 2]>,
}

impl<'a> SagaRun<'a> {
    fn new(opportunity: &'a Opportunity) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity,
            phase: Phase::Idle,
            started_at: Utc::now(),
            balances: None,
            allocation: None,
            requests: None,
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(cycle_id = %self.id, from = %self.phase, to = %phase, "Saga transition");
        self.phase = phase;
    }

    fn finish(self, status: CycleStatus, outcomes: Option<[LegOutcome; 2]>) -> CycleResult {
        CycleResult {
            id: self.id,
            opportunity: self.opportunity.clone(),
            status,
            balances: self.balances,
            allocation: self.allocation,
            requests: self.requests,
            outcomes,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn abort(self, err: ArbError) -> CycleResult {
        error!(
            cycle_id = %self.id,
            phase = %self.phase,
            kind = ?err.kind(),
            reason = %err,
            "Opportunity aborted"
        );
        let status = CycleStatus::Aborted {
            phase: self.phase,
            kind: err.kind(),
            reason: err.to_string(),
        };
        self.finish(status, None)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct ArbitrageExecutor {
    registry: Arc<AdapterRegistry>,
    converter: Arc<CurrencyConverter>,
    balances: BalanceAggregator,
    reset: ResourceReset,
    config: ExecutionConfig,
}

impl ArbitrageExecutor {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        converter: Arc<CurrencyConverter>,
        reset: ResourceReset,
        config: ExecutionConfig,
    ) -> Self {
        let balances = BalanceAggregator::new(registry.clone(), config.balance_timeout);
        Self {
            registry,
            converter,
            balances,
            reset,
            config,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run the full saga for one opportunity. Never panics on adapter,
    /// conversion or stake failures; they are reported in the result.
    pub async fn execute(&self, opportunity: &Opportunity) -> CycleResult {
        let mut run = SagaRun::new(opportunity);

        info!(
            cycle_id = %run.id,
            sport = %opportunity.sport,
            teams = %opportunity.matchup(),
            bookmakers = format!("{} vs {}", opportunity.legs[0].bookmaker, opportunity.legs[1].bookmaker),
            profit = format!("{}%", opportunity.profit_percent),
            "Executing opportunity"
        );

        // -- BALANCE_CHECK ---------------------------------------------------
        run.enter(Phase::BalanceCheck);
        if let Err(e) = validate(opportunity) {
            return run.abort(e);
        }
        let balances = self.balances.fetch(opportunity).await;
        run.balances = Some(balances.clone());

        // -- FEASIBILITY_GATE ------------------------------------------------
        run.enter(Phase::FeasibilityGate);
        if let Err(e) = Self::feasibility_gate(opportunity, &balances) {
            self.reset.release(&self.registry, opportunity).await;
            return run.abort(e);
        }

        // -- STAKE_CALC ------------------------------------------------------
        run.enter(Phase::StakeCalc);
        let (allocation, requests) = match self.plan_stakes(opportunity, &balances).await {
            Ok(plan) => plan,
            Err(e) => {
                self.reset.release(&self.registry, opportunity).await;
                return run.abort(e);
            }
        };
        info!(cycle_id = %run.id, allocation = %allocation, "Stakes computed");
        run.allocation = Some(allocation);
        run.requests = Some(requests.clone());

        // -- RESOURCE_RESET --------------------------------------------------
        run.enter(Phase::ResourceReset);
        self.reset.run(&self.registry, opportunity).await;

        // -- LEG1_PLACE / LEG2_PLACE -----------------------------------------
        run.enter(Phase::Leg1Place);
        let first = self.place(&requests[0]).await;
        run.enter(Phase::Leg2Place);
        let second = self.place(&requests[1]).await;

        // -- DONE ------------------------------------------------------------
        run.enter(Phase::Done);
        let result = run.finish(CycleStatus::Completed, Some([first, second]));
        Self::log_result(&result);
        result
    }

    /// Both legs must be logged in and the odds must still imply a profit.
    fn feasibility_gate(
        opportunity: &Opportunity,
        balances: &[BalanceReading; 2],
    ) -> Result<(), ArbError> {
        let logged_out: Vec<String> = balances
            .iter()
            .filter(|b| !b.is_logged_in)
            .map(|b| {
                format!(
                    "{} ({})",
                    b.bookmaker,
                    b.error.as_deref().unwrap_or("not logged in")
                )
            })
            .collect();
        if !logged_out.is_empty() {
            return Err(ArbError::NotAuthenticated(logged_out.join(", ")));
        }

        let (odd1, odd2) = opportunity.odds();
        let (p1, p2) = implied_probabilities(odd1, odd2)?;
        if p1 + p2 >= Decimal::ONE {
            return Err(ArbError::NoArbitrage { implied: p1 + p2 });
        }
        Ok(())
    }

    /// Compute a balance-feasible split and the per-leg requests in each
    /// bookmaker's native currency.
    async fn plan_stakes(
        &self,
        opportunity: &Opportunity,
        balances: &[BalanceReading; 2],
    ) -> Result<(StakeAllocation, [LegBetRequest; 2]), ArbError> {
        let reference = self.config.reference_currency.as_str();
        let (odd1, odd2) = opportunity.odds();

        let available = [
            self.converter
                .convert(balances[0].amount, &balances[0].currency, reference)
                .await?,
            self.converter
                .convert(balances[1].amount, &balances[1].currency, reference)
                .await?,
        ];
        debug!(
            leg1 = %available[0],
            leg2 = %available[1],
            currency = %reference,
            "Balances in reference currency"
        );

        let mut allocation = budget_allocation(odd1, odd2, self.config.max_exposure)?;
        // Re-anchoring only scales stakes down, so a leg already below the
        // minimum can never recover.
        self.check_min_stakes(opportunity, &allocation)?;

        if let Some(binding) = Self::binding_leg(&allocation, &available) {
            let funds = available[binding.index()];
            if funds <= Decimal::ZERO {
                return Err(ArbError::InsufficientBalance {
                    bookmaker: opportunity.leg(binding).bookmaker.clone(),
                    needed: allocation.stake(binding),
                    available: funds,
                });
            }
            let known = funds.round_dp_with_strategy(2, RoundingStrategy::ToZero);
            info!(
                leg = %binding,
                bookmaker = %opportunity.leg(binding).bookmaker,
                budget_stake = %allocation.stake(binding),
                available = %known,
                "Balance binds, re-anchoring stakes"
            );
            allocation = known_stake_allocation(odd1, odd2, KnownStake::new(binding, known))?;
            self.check_min_stakes(opportunity, &allocation)?;
        }

        if !allocation.verified {
            return Err(ArbError::VerificationFailed {
                difference: (allocation.profit_if_outcome1 - allocation.profit_if_outcome2).abs(),
            });
        }

        let first = self.leg_request(opportunity, &allocation, balances, LegId::First).await?;
        let second = self.leg_request(opportunity, &allocation, balances, LegId::Second).await?;
        Ok((allocation, [first, second]))
    }

    /// Convert one leg's stake back into the bookmaker's own currency.
    async fn leg_request(
        &self,
        opportunity: &Opportunity,
        allocation: &StakeAllocation,
        balances: &[BalanceReading; 2],
        leg: LegId,
    ) -> Result<LegBetRequest, ArbError> {
        let balance = &balances[leg.index()];
        let mut reference_stake = allocation.stake(leg);
        let mut native = self
            .converter
            .convert(reference_stake, &self.config.reference_currency, &balance.currency)
            .await?;
        // Conversion rounding must never push a stake above the balance.
        if native > balance.amount {
            let clamped = balance.amount.round_dp_with_strategy(2, RoundingStrategy::ToZero);
            let scaled = (reference_stake * clamped)
                .checked_div(native)
                .unwrap_or(Decimal::ZERO)
                .round_dp_with_strategy(2, RoundingStrategy::ToZero);
            warn!(
                leg = %leg,
                bookmaker = %balance.bookmaker,
                requested = %native,
                balance = %balance.amount,
                shaved = %(native - clamped),
                currency = %balance.currency,
                reference_stake = %scaled,
                "Native stake exceeds balance, clamping"
            );
            native = clamped;
            reference_stake = scaled;
        }
        Ok(LegBetRequest::new(
            opportunity,
            leg,
            native,
            &balance.currency,
            reference_stake,
        ))
    }

    fn check_min_stakes(
        &self,
        opportunity: &Opportunity,
        allocation: &StakeAllocation,
    ) -> Result<(), ArbError> {
        for leg in LegId::BOTH {
            let stake = allocation.stake(leg);
            if stake < self.config.min_stake {
                return Err(ArbError::InsufficientBalance {
                    bookmaker: opportunity.leg(leg).bookmaker.clone(),
                    needed: self.config.min_stake,
                    available: stake,
                });
            }
        }
        Ok(())
    }

    /// The leg whose balance covers the smallest share of its budget stake,
    /// if any leg is short. A zero stake never binds.
    fn binding_leg(allocation: &StakeAllocation, available: &[Decimal; 2]) -> Option<LegId> {
        let ratio = |leg: LegId| {
            let stake = allocation.stake(leg);
            if stake <= available[leg.index()] {
                return None;
            }
            available[leg.index()].checked_div(stake)
        };
        match (ratio(LegId::First), ratio(LegId::Second)) {
            (Some(first), Some(second)) if second < first => Some(LegId::Second),
            (Some(_), _) => Some(LegId::First),
            (None, Some(_)) => Some(LegId::Second),
            (None, None) => None,
        }
    }

    /// Place one leg with a timeout. Adapter errors become a failed outcome.
    async fn place(&self, request: &LegBetRequest) -> LegOutcome {
        let entry = match self.registry.require(&request.bookmaker) {
            Ok(entry) => entry,
            Err(e) => {
                error!(bookmaker = %request.bookmaker, error = %e, "No adapter at placement");
                return LegOutcome::rejected(request, e.to_string());
            }
        };

        info!(request = %request, "Placing leg");

        let outcome = match tokio::time::timeout(
            self.config.placement_timeout,
            entry.adapter.place_bet(request),
        )
        .await
        {
            Ok(Ok(mut outcome)) => {
                outcome.leg = request.leg;
                outcome.bookmaker = entry.id.clone();
                outcome
            }
            Ok(Err(e)) => LegOutcome::rejected(request, format!("adapter error: {e:#}")),
            Err(_) => LegOutcome::rejected(
                request,
                format!(
                    "placement timed out after {:?}; outcome unknown, reconcile manually",
                    self.config.placement_timeout
                ),
            ),
        };

        match (outcome.placed, outcome.verified) {
            (true, true) => info!(outcome = %outcome, "Leg placed"),
            (true, false) => warn!(
                outcome = %outcome,
                "Leg reported placed without bet-slip confirmation"
            ),
            (false, _) => error!(outcome = %outcome, "Leg placement failed"),
        }
        outcome
    }

    fn log_result(result: &CycleResult) {
        let summary = result.summary();
        if result.is_one_sided() {
            error!(
                cycle_id = %result.id,
                teams = %result.opportunity.matchup(),
                leg1_placed = summary.leg1_placed,
                leg2_placed = summary.leg2_placed,
                "ONE-SIDED EXPOSURE: only one leg placed, manual hedge required"
            );
        }
        info!(
            cycle_id = %result.id,
            arbitrage_profit = format!("{:.2}%", summary.profit_percent),
            total_stake = format!("{:.2}", summary.total_stake),
            leg1_placed = summary.leg1_placed,
            leg2_placed = summary.leg2_placed,
            leg1_verified = summary.leg1_verified,
            leg2_verified = summary.leg2_verified,
            "Opportunity processed"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

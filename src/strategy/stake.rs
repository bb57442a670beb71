//! Arbitrage stake calculator.
//!
//! Pure functions that split money across the two legs of an arbitrage so
//! both outcomes pay the same amount. Implied probability of a decimal odd
//! is `1 / odd`; an arbitrage exists only while the two implied
//! probabilities sum to less than one.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{round_money, ArbError, LegId, StakeAllocation, StakeAnchor};

/// Largest allowed gap between the two outcome payouts (unrounded).
pub const PAYOUT_TOLERANCE: Decimal = dec!(0.01);

/// A stake fixed on one leg, from which the other is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownStake {
    pub leg: LegId,
    pub stake: Decimal,
}

impl KnownStake {
    pub fn new(leg: LegId, stake: Decimal) -> Self {
        Self { leg, stake }
    }
}

/// Implied probabilities `(p1, p2)` for a pair of decimal odds.
pub fn implied_probabilities(odd1: Decimal, odd2: Decimal) -> Result<(Decimal, Decimal), ArbError> {
    for odd in [odd1, odd2] {
        if odd <= Decimal::ONE {
            return Err(ArbError::InvalidOdds { odd });
        }
    }
    Ok((Decimal::ONE / odd1, Decimal::ONE / odd2))
}

/// Whether the pair of odds still implies a guaranteed profit.
pub fn is_arbitrage(odd1: Decimal, odd2: Decimal) -> bool {
    implied_probabilities(odd1, odd2)
        .map(|(p1, p2)| p1 + p2 < Decimal::ONE)
        .unwrap_or(false)
}

/// Split `max_total` across both legs in proportion to implied probability.
pub fn budget_allocation(
    odd1: Decimal,
    odd2: Decimal,
    max_total: Decimal,
) -> Result<StakeAllocation, ArbError> {
    if max_total <= Decimal::ZERO {
        return Err(ArbError::InvalidStake(max_total));
    }
    let (p1, p2, sum) = feasible(odd1, odd2)?;

    let stake1 = max_total * p1 / sum;
    let stake2 = max_total * p2 / sum;

    Ok(build(odd1, odd2, stake1, stake2, sum, StakeAnchor::Budget))
}

/// Derive the full split from a stake fixed on one leg.
///
/// The total is back-solved as `known / (p_known / (p1 + p2))`.
pub fn known_stake_allocation(
    odd1: Decimal,
    odd2: Decimal,
    known: KnownStake,
) -> Result<StakeAllocation, ArbError> {
    if known.stake <= Decimal::ZERO {
        return Err(ArbError::InvalidStake(known.stake));
    }
    let (p1, p2, sum) = feasible(odd1, odd2)?;

    let p_known = match known.leg {
        LegId::First => p1,
        LegId::Second => p2,
    };
    let total = known.stake / (p_known / sum);
    let other = total - known.stake;

    let (stake1, stake2) = match known.leg {
        LegId::First => (known.stake, other),
        LegId::Second => (other, known.stake),
    };

    Ok(build(
        odd1,
        odd2,
        stake1,
        stake2,
        sum,
        StakeAnchor::KnownLeg(known.leg),
    ))
}

/// Validate odds and reject pairs that no longer imply a profit.
fn feasible(odd1: Decimal, odd2: Decimal) -> Result<(Decimal, Decimal, Decimal), ArbError> {
    let (p1, p2) = implied_probabilities(odd1, odd2)?;
    let sum = p1 + p2;
    if sum >= Decimal::ONE {
        debug!(odd1 = %odd1, odd2 = %odd2, implied = %sum.round_dp(4), "No arbitrage");
        return Err(ArbError::NoArbitrage { implied: sum });
    }
    Ok((p1, p2, sum))
}

/// Verify the split on unrounded values, then round for reporting.
fn build(
    odd1: Decimal,
    odd2: Decimal,
    stake1: Decimal,
    stake2: Decimal,
    implied_sum: Decimal,
    anchor: StakeAnchor,
) -> StakeAllocation {
    let total = stake1 + stake2;
    let payout1 = stake1 * odd1;
    let payout2 = stake2 * odd2;
    let difference = (payout1 - payout2).abs();
    let verified = difference < PAYOUT_TOLERANCE;

    let profit_percent = (Decimal::ONE - implied_sum) / implied_sum * dec!(100);

    debug!(
        stake1 = %stake1.round_dp(4),
        stake2 = %stake2.round_dp(4),
        difference = %difference.round_dp(6),
        verified,
        "Stake split computed"
    );

    StakeAllocation {
        odd1,
        odd2,
        stake1: round_money(stake1),
        stake2: round_money(stake2),
        total_stake: round_money(total),
        expected_profit: round_money(payout1 - total),
        profit_if_outcome1: round_money(payout1 - total),
        profit_if_outcome2: round_money(payout2 - total),
        profit_percent: round_money(profit_percent),
        verified,
        anchor,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

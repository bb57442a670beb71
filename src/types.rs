//! Shared types for the SUREBET engine.
//!
//! These types form the data model used across all modules: the
//! opportunity being executed, the per-leg balance readings and bet
//! requests, the stake split, and the aggregated result of one run of
//! the execution saga.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// Which side of the arbitrage pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegId {
    First,
    Second,
}

impl LegId {
    pub const BOTH: [LegId; 2] = [LegId::First, LegId::Second];

    /// Array index of this leg in `[_; 2]` containers.
    pub fn index(self) -> usize {
        match self {
            LegId::First => 0,
            LegId::Second => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            LegId::First => LegId::Second,
            LegId::Second => LegId::First,
        }
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegId::First => write!(f, "leg1"),
            LegId::Second => write!(f, "leg2"),
        }
    }
}

/// One leg of an opportunity, as seen from a single bookmaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    /// Bookmaker identifier, lower-case (registry key).
    pub bookmaker: String,
    pub team1: String,
    pub team2: String,
    pub league: String,
    /// Bet-type code as the scraper reports it (e.g. `DNB1`).
    pub bet_type: String,
    /// Decimal odd offered by this bookmaker.
    pub odd: Decimal,
    /// Deep link to the wager page.
    pub link: String,
}

/// A candidate two-leg arbitrage. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Profit estimate reported by the scraper, in percent.
    pub profit_percent: Decimal,
    pub sport: String,
    pub event_time: String,
    pub legs: [Leg; 2],
}

impl Opportunity {
    pub fn leg(&self, id: LegId) -> &Leg {
        &self.legs[id.index()]
    }

    /// Both odds in leg order.
    pub fn odds(&self) -> (Decimal, Decimal) {
        (self.legs[0].odd, self.legs[1].odd)
    }

    /// "Team A vs Team B" from the first leg's perspective.
    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.legs[0].team1, self.legs[0].team2)
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {} @ {} vs {} @ {} | profit {}%",
            self.sport,
            self.matchup(),
            self.legs[0].bookmaker,
            self.legs[0].odd,
            self.legs[1].bookmaker,
            self.legs[1].odd,
            self.profit_percent,
        )
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Currency assumed for readings that failed before a currency was known.
pub const FALLBACK_CURRENCY: &str = "USD";

/// A single balance read from one bookmaker account.
///
/// Created fresh for every saga run and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReading {
    pub bookmaker: String,
    pub is_logged_in: bool,
    pub amount: Decimal,
    /// ISO 4217 code, upper-case.
    pub currency: String,
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl BalanceReading {
    pub fn logged_in(bookmaker: &str, amount: Decimal, currency: &str) -> Self {
        Self {
            bookmaker: bookmaker.to_string(),
            is_logged_in: true,
            amount,
            currency: currency.trim().to_uppercase(),
            error: None,
            fetched_at: Utc::now(),
        }
    }

    /// Zero-balance, not-logged-in reading annotated with the failure.
    pub fn failed(bookmaker: &str, error: impl Into<String>) -> Self {
        Self {
            bookmaker: bookmaker.to_string(),
            is_logged_in: false,
            amount: Decimal::ZERO,
            currency: FALLBACK_CURRENCY.to_string(),
            error: Some(error.into()),
            fetched_at: Utc::now(),
        }
    }
}

impl fmt::Display for BalanceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_logged_in {
            write!(f, "[{}] {:.2} {}", self.bookmaker, self.amount, self.currency)
        } else {
            write!(
                f,
                "[{}] not logged in ({})",
                self.bookmaker,
                self.error.as_deref().unwrap_or("no reason given"),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Stake allocation
// ---------------------------------------------------------------------------

/// What constrained the stake split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeAnchor {
    /// Split of a total budget.
    Budget,
    /// One leg's stake was fixed (usually by its balance).
    KnownLeg(LegId),
}

/// Arbitrage-neutral stake split, in the reference currency.
///
/// `profit_if_outcome1` and `profit_if_outcome2` must agree within one
/// cent; `verified` records whether they did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeAllocation {
    pub odd1: Decimal,
    pub odd2: Decimal,
    pub stake1: Decimal,
    pub stake2: Decimal,
    pub total_stake: Decimal,
    pub expected_profit: Decimal,
    pub profit_if_outcome1: Decimal,
    pub profit_if_outcome2: Decimal,
    pub profit_percent: Decimal,
    pub verified: bool,
    pub anchor: StakeAnchor,
}

impl StakeAllocation {
    pub fn stake(&self, leg: LegId) -> Decimal {
        match leg {
            LegId::First => self.stake1,
            LegId::Second => self.stake2,
        }
    }
}

impl fmt::Display for StakeAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stake1={:.2} @ {} | stake2={:.2} @ {} | total={:.2} | profit={:.2} ({:.2}%)",
            self.stake1,
            self.odd1,
            self.stake2,
            self.odd2,
            self.total_stake,
            self.expected_profit,
            self.profit_percent,
        )
    }
}

// ---------------------------------------------------------------------------
// Leg requests & outcomes
// ---------------------------------------------------------------------------

/// A leg's stake in that bookmaker's native currency, ready for its adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegBetRequest {
    pub leg: LegId,
    pub bookmaker: String,
    pub sport: String,
    pub event_time: String,
    pub team1: String,
    pub team2: String,
    pub league: String,
    pub bet_type: String,
    pub odd: Decimal,
    pub link: String,
    /// Stake in `currency`.
    pub stake: Decimal,
    pub currency: String,
    /// The same stake in the reference currency.
    pub reference_stake: Decimal,
}

impl LegBetRequest {
    pub fn new(
        opportunity: &Opportunity,
        leg: LegId,
        stake: Decimal,
        currency: &str,
        reference_stake: Decimal,
    ) -> Self {
        let source = opportunity.leg(leg);
        Self {
            leg,
            bookmaker: source.bookmaker.clone(),
            sport: opportunity.sport.clone(),
            event_time: opportunity.event_time.clone(),
            team1: source.team1.clone(),
            team2: source.team2.clone(),
            league: source.league.clone(),
            bet_type: source.bet_type.clone(),
            odd: source.odd,
            link: source.link.clone(),
            stake,
            currency: currency.to_string(),
            reference_stake,
        }
    }
}

impl fmt::Display for LegBetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} vs {} @ {} stake {:.2} {}",
            self.bookmaker,
            self.leg,
            self.bet_type,
            self.team1,
            self.team2,
            self.odd,
            self.stake,
            self.currency,
        )
    }
}

/// Result of attempting to place one leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegOutcome {
    pub leg: LegId,
    pub bookmaker: String,
    /// The adapter reports the bet as placed.
    pub placed: bool,
    /// The placement was confirmed by reading back the bet slip/history.
    pub verified: bool,
    pub stake: Decimal,
    pub currency: String,
    /// Bookmaker-side bet reference, when one was returned.
    pub reference: Option<String>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl LegOutcome {
    /// Placed and confirmed by read-back.
    pub fn confirmed(request: &LegBetRequest, reference: Option<String>) -> Self {
        Self::from_request(request, true, true, reference, None)
    }

    /// Placed according to the adapter, without read-back confirmation.
    pub fn unverified(request: &LegBetRequest, reference: Option<String>) -> Self {
        Self::from_request(request, true, false, reference, None)
    }

    pub fn rejected(request: &LegBetRequest, error: impl Into<String>) -> Self {
        Self::from_request(request, false, false, None, Some(error.into()))
    }

    fn from_request(
        request: &LegBetRequest,
        placed: bool,
        verified: bool,
        reference: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            leg: request.leg,
            bookmaker: request.bookmaker.clone(),
            placed,
            verified,
            stake: request.stake,
            currency: request.currency.clone(),
            reference,
            error,
            finished_at: Utc::now(),
        }
    }
}

impl fmt::Display for LegOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.placed, self.verified) {
            (true, true) => "PLACED",
            (true, false) => "PLACED (unverified)",
            (false, _) => "FAILED",
        };
        write!(
            f,
            "[{}] {} {} {:.2} {}",
            self.bookmaker, self.leg, state, self.stake, self.currency,
        )?;
        if let Some(ref e) = self.error {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Saga phases & results
// ---------------------------------------------------------------------------

/// Phases of the execution saga, in order. `Abort` is reachable from any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    BalanceCheck,
    FeasibilityGate,
    StakeCalc,
    ResourceReset,
    Leg1Place,
    Leg2Place,
    Done,
    Abort,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "IDLE",
            Phase::BalanceCheck => "BALANCE_CHECK",
            Phase::FeasibilityGate => "FEASIBILITY_GATE",
            Phase::StakeCalc => "STAKE_CALC",
            Phase::ResourceReset => "RESOURCE_RESET",
            Phase::Leg1Place => "LEG1_PLACE",
            Phase::Leg2Place => "LEG2_PLACE",
            Phase::Done => "DONE",
            Phase::Abort => "ABORT",
        };
        write!(f, "{s}")
    }
}

/// Why an opportunity was abandoned before placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortKind {
    /// Odds no longer imply profit, or the split failed verification.
    Infeasible,
    /// A leg is not logged in.
    Authentication,
    /// Both currency conversion paths failed.
    Conversion,
    /// A balance cannot cover a usable stake.
    InsufficientBalance,
    /// Anything else (bad opportunity data, unknown bookmaker).
    Internal,
}

/// Terminal state of one saga run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleStatus {
    /// All phases ran; individual legs may still have failed.
    Completed,
    Aborted {
        /// The phase that was running when the saga aborted.
        phase: Phase,
        kind: AbortKind,
        reason: String,
    },
}

/// Aggregated result of driving one opportunity through the saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub id: Uuid,
    pub opportunity: Opportunity,
    pub status: CycleStatus,
    pub balances: Option<[BalanceReading; 2]>,
    pub allocation: Option<StakeAllocation>,
    pub requests: Option<[LegBetRequest; 2]>,
    pub outcomes: Option<[LegOutcome; 2]>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CycleResult {
    /// Result for a run that died before producing its own. Where it stopped
    /// is unknown, so the phase is `ABORT` and nothing is carried over.
    pub fn crashed(
        opportunity: Opportunity,
        started_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            opportunity,
            status: CycleStatus::Aborted {
                phase: Phase::Abort,
                kind: AbortKind::Internal,
                reason: reason.into(),
            },
            balances: None,
            allocation: None,
            requests: None,
            outcomes: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Whether the saga reached DONE (regardless of leg success).
    pub fn is_completed(&self) -> bool {
        self.status == CycleStatus::Completed
    }

    pub fn leg_placed(&self, leg: LegId) -> bool {
        self.outcomes
            .as_ref()
            .map(|o| o[leg.index()].placed)
            .unwrap_or(false)
    }

    pub fn both_placed(&self) -> bool {
        self.leg_placed(LegId::First) && self.leg_placed(LegId::Second)
    }

    /// Exactly one leg placed: the operator holds a directional position.
    pub fn is_one_sided(&self) -> bool {
        self.leg_placed(LegId::First) != self.leg_placed(LegId::Second)
    }

    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            CycleStatus::Aborted { reason, .. } => Some(reason),
            CycleStatus::Completed => None,
        }
    }

    pub fn summary(&self) -> CycleSummary {
        let verified = |leg: LegId| {
            self.outcomes
                .as_ref()
                .map(|o| o[leg.index()].verified)
                .unwrap_or(false)
        };
        CycleSummary {
            total_stake: self
                .allocation
                .as_ref()
                .map(|a| a.total_stake)
                .unwrap_or(Decimal::ZERO),
            profit_percent: self
                .allocation
                .as_ref()
                .map(|a| a.profit_percent)
                .unwrap_or(Decimal::ZERO),
            leg1_placed: self.leg_placed(LegId::First),
            leg2_placed: self.leg_placed(LegId::Second),
            leg1_verified: verified(LegId::First),
            leg2_verified: verified(LegId::Second),
            one_sided: self.is_one_sided(),
        }
    }
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CycleStatus::Completed => {
                let s = self.summary();
                write!(
                    f,
                    "{} | DONE | total={:.2} profit={:.2}% leg1={} leg2={}",
                    self.opportunity.matchup(),
                    s.total_stake,
                    s.profit_percent,
                    s.leg1_placed,
                    s.leg2_placed,
                )
            }
            CycleStatus::Aborted { phase, kind, reason } => write!(
                f,
                "{} | ABORT at {phase} ({kind:?}): {reason}",
                self.opportunity.matchup(),
            ),
        }
    }
}

/// Compact summary of a saga run, written to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub total_stake: Decimal,
    pub profit_percent: Decimal,
    pub leg1_placed: bool,
    pub leg2_placed: bool,
    pub leg1_verified: bool,
    pub leg2_verified: bool,
    pub one_sided: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SUREBET.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbError {
    #[error("Invalid odd {odd}: decimal odds must be greater than 1")]
    InvalidOdds { odd: Decimal },

    #[error("Invalid stake {0}: must be positive")]
    InvalidStake(Decimal),

    #[error("No arbitrage: combined implied probability {implied:.4} >= 1")]
    NoArbitrage { implied: Decimal },

    #[error("Stake split failed verification: outcome payouts differ by {difference:.4}")]
    VerificationFailed { difference: Decimal },

    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Currency conversion {from}->{to} failed: {message}")]
    Conversion {
        from: String,
        to: String,
        message: String,
    },

    #[error("Insufficient balance on {bookmaker}: need {needed:.2}, have {available:.2}")]
    InsufficientBalance {
        bookmaker: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("Unknown bookmaker: {0}")]
    UnknownBookmaker(String),

    #[error("Invalid opportunity: {0}")]
    InvalidOpportunity(String),
}

impl ArbError {
    /// Abort category recorded in the cycle result.
    pub fn kind(&self) -> AbortKind {
        match self {
            ArbError::InvalidOdds { .. }
            | ArbError::NoArbitrage { .. }
            | ArbError::VerificationFailed { .. } => AbortKind::Infeasible,
            ArbError::NotAuthenticated(_) => AbortKind::Authentication,
            ArbError::Conversion { .. } => AbortKind::Conversion,
            ArbError::InvalidStake(_) | ArbError::InsufficientBalance { .. } => {
                AbortKind::InsufficientBalance
            }
            ArbError::UnknownBookmaker(_) | ArbError::InvalidOpportunity(_) => {
                AbortKind::Internal
            }
        }
    }
}

/// Round a money amount to cents.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

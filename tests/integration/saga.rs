//! End-to-end saga runs against mock bookmakers.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use surebet::engine::executor::ExecutionConfig;
use surebet::types::*;

use crate::mock_bookmaker::*;

fn aborted(result: &CycleResult) -> (Phase, AbortKind) {
    match &result.status {
        CycleStatus::Aborted { phase, kind, .. } => (*phase, *kind),
        CycleStatus::Completed => panic!("expected abort, got {result}"),
    }
}

#[tokio::test]
async fn test_both_legs_placed_within_exposure() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.is_completed());
    assert!(result.both_placed());
    assert!(!result.is_one_sided());

    let alloc = result.allocation.clone().unwrap();
    assert_eq!(alloc.stake1, dec!(15.35));
    assert_eq!(alloc.stake2, dec!(14.65));
    assert_eq!(alloc.total_stake, dec!(30.00));
    assert!(alloc.verified);

    // Leg 1 goes to the first bookmaker only, leg 2 to the second.
    let first = nairabet.placed();
    let second = leon.placed();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].leg, LegId::First);
    assert_eq!(first[0].bet_type, "DNB1");
    assert_eq!(first[0].stake, dec!(15.35));
    assert_eq!(second[0].leg, LegId::Second);
    assert_eq!(second[0].stake, dec!(14.65));

    assert_eq!(nairabet.balance(), dec!(84.65));
    assert_eq!(leon.balance(), dec!(85.35));

    let summary = result.summary();
    assert!(summary.leg1_verified && summary.leg2_verified);
}

#[tokio::test]
async fn test_not_logged_in_aborts_without_placing() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    leon.set_logged_in(false);
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert_eq!(aborted(&result), (Phase::FeasibilityGate, AbortKind::Authentication));
    assert!(result.abort_reason().unwrap().contains("leon"));
    assert!(result.outcomes.is_none());
    assert!(nairabet.placed().is_empty());
    assert!(leon.placed().is_empty());

    // Both balance checks ran, and resources were released on abort.
    assert_eq!(nairabet.balance_checks(), 1);
    assert_eq!(leon.balance_checks(), 1);
    assert_eq!(nairabet.releases(), 1);
    assert_eq!(leon.releases(), 1);
}

#[tokio::test]
async fn test_balance_error_on_one_leg_still_reads_the_other() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    nairabet.set_balance_error("browser crashed");
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert_eq!(aborted(&result), (Phase::FeasibilityGate, AbortKind::Authentication));
    let balances = result.balances.clone().unwrap();
    assert!(!balances[0].is_logged_in);
    assert_eq!(balances[0].amount, dec!(0));
    assert!(balances[0].error.as_deref().unwrap().contains("browser crashed"));
    assert!(balances[1].is_logged_in);
    assert_eq!(balances[1].amount, dec!(100));
}

#[tokio::test]
async fn test_odds_without_arbitrage_abort_as_infeasible() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(1.90), dec!(1.95))).await;

    assert_eq!(aborted(&result), (Phase::FeasibilityGate, AbortKind::Infeasible));
    assert!(nairabet.placed().is_empty());
    assert!(leon.placed().is_empty());
}

#[tokio::test]
async fn test_unregistered_bookmaker_never_places() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    let exec = executor(nairabet.clone(), leon.clone());

    let mut opp = opportunity(dec!(2.10), dec!(2.20));
    opp.legs[1].bookmaker = "bet9ja".to_string();
    let result = exec.execute(&opp).await;

    assert_eq!(aborted(&result), (Phase::FeasibilityGate, AbortKind::Authentication));
    assert!(result.abort_reason().unwrap().contains("bet9ja"));
    assert!(nairabet.placed().is_empty());
}

#[tokio::test]
async fn test_short_leg_rescales_both_stakes() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(10));
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.both_placed());
    let alloc = result.allocation.unwrap();
    assert_eq!(alloc.anchor, StakeAnchor::KnownLeg(LegId::Second));
    assert_eq!(alloc.stake2, dec!(10.00));
    assert_eq!(alloc.stake1, dec!(10.48));
    assert!(alloc.total_stake < dec!(30));
    assert_eq!(leon.balance(), dec!(0));
}

#[tokio::test]
async fn test_first_leg_rejection_still_attempts_second() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    nairabet.set_placement(Placement::Reject("odds changed".into()));
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.is_completed());
    assert!(!result.leg_placed(LegId::First));
    assert!(result.leg_placed(LegId::Second));
    assert!(result.is_one_sided());
    assert!(result.summary().one_sided);

    let outcomes = result.outcomes.unwrap();
    assert_eq!(outcomes[0].error.as_deref(), Some("odds changed"));
    assert_eq!(leon.placed().len(), 1);
}

#[tokio::test]
async fn test_adapter_error_becomes_failed_outcome() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    leon.set_placement(Placement::Error("selector not found".into()));
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.is_completed());
    assert!(result.leg_placed(LegId::First));
    let outcomes = result.outcomes.unwrap();
    assert!(!outcomes[1].placed);
    let err = outcomes[1].error.as_deref().unwrap();
    assert!(err.contains("adapter error"));
    assert!(err.contains("selector not found"));
}

#[tokio::test(start_paused = true)]
async fn test_hung_placement_times_out_and_second_leg_runs() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    nairabet.set_placement(Placement::Hang);
    let exec = executor_with(
        nairabet.clone(),
        leon.clone(),
        Arc::new(StaticRates::default()),
        ExecutionConfig {
            placement_timeout: Duration::from_secs(5),
            ..ExecutionConfig::default()
        },
    );

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    let outcomes = result.outcomes.clone().unwrap();
    assert!(!outcomes[0].placed);
    assert!(outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("reconcile manually"));
    assert!(outcomes[1].placed);
    assert!(result.is_one_sided());
}

#[tokio::test]
async fn test_unverified_placement_is_flagged() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(100));
    leon.set_placement(Placement::Unverified);
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.both_placed());
    let summary = result.summary();
    assert!(summary.leg1_verified);
    assert!(!summary.leg2_verified);
    assert!(!summary.one_sided);
}

#[tokio::test]
async fn test_exotic_currency_leg_uses_network_rates() {
    let nairabet = Arc::new(MockBookmaker::new("nairabet", dec!(50000), "NGN"));
    let leon = usd_account("leon", dec!(100));
    let rates = Arc::new(
        StaticRates::default()
            .with_table("NGN", &[("USD", dec!(0.00065))])
            .with_table("USD", &[("NGN", dec!(1538.46))]),
    );
    let exec = executor_with(
        nairabet.clone(),
        leon.clone(),
        rates.clone(),
        ExecutionConfig::default(),
    );

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.both_placed());
    let requests = result.requests.unwrap();
    assert_eq!(requests[0].currency, "NGN");
    assert_eq!(requests[0].reference_stake, dec!(15.35));
    assert_eq!(requests[0].stake, dec!(23615.36));
    assert_eq!(requests[1].currency, "USD");
    assert_eq!(requests[1].stake, dec!(14.65));
    assert_eq!(rates.calls(), 2);
}

#[tokio::test]
async fn test_missing_rates_abort_in_stake_calc() {
    let nairabet = Arc::new(MockBookmaker::new("nairabet", dec!(50000), "NGN"));
    let leon = usd_account("leon", dec!(100));
    let exec = executor_with(
        nairabet.clone(),
        leon.clone(),
        Arc::new(StaticRates::default()),
        ExecutionConfig::default(),
    );

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert_eq!(aborted(&result), (Phase::StakeCalc, AbortKind::Conversion));
    assert!(nairabet.placed().is_empty());
    assert!(leon.placed().is_empty());
    assert_eq!(nairabet.releases(), 1);
}

#[tokio::test]
async fn test_rounded_to_zero_stake_aborts_as_insufficient() {
    let nairabet = usd_account("nairabet", dec!(100));
    let leon = usd_account("leon", dec!(10));
    let exec = executor(nairabet.clone(), leon.clone());

    let result = exec.execute(&opportunity(dec!(10000), dec!(1.0005))).await;

    assert_eq!(aborted(&result), (Phase::StakeCalc, AbortKind::InsufficientBalance));
    assert!(result.abort_reason().unwrap().contains("nairabet"));
    assert!(nairabet.placed().is_empty());
    assert!(leon.placed().is_empty());
    assert_eq!(leon.releases(), 1);
}

#[tokio::test]
async fn test_native_stake_clamped_to_balance_rescales_reference() {
    // The return rate is richer than the inverse of the outbound one, so
    // converting the anchored stake back overshoots the balance.
    let nairabet = Arc::new(MockBookmaker::new("nairabet", dec!(20000), "NGN"));
    let leon = usd_account("leon", dec!(100));
    let rates = Arc::new(
        StaticRates::default()
            .with_table("NGN", &[("USD", dec!(0.00065))])
            .with_table("USD", &[("NGN", dec!(1600))]),
    );
    let exec = executor_with(
        nairabet.clone(),
        leon.clone(),
        rates,
        ExecutionConfig::default(),
    );

    let result = exec.execute(&opportunity(dec!(2.10), dec!(2.20))).await;

    assert!(result.both_placed());
    let requests = result.requests.unwrap();
    assert_eq!(requests[0].stake, dec!(20000));
    assert_eq!(requests[0].reference_stake, dec!(12.50));
    assert!(requests[0].reference_stake < result.allocation.unwrap().stake1);
    assert_eq!(nairabet.balance(), dec!(0));
}

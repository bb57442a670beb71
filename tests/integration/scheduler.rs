//! Scheduler cycles over an opportunity file, with the audit log.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use surebet::engine::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use surebet::engine::scraper::ScraperTrigger;
use surebet::storage::AuditLog;
use surebet::types::{AbortKind, CycleStatus, Phase};

use crate::mock_bookmaker::*;

/// Scraper that writes one queued batch per run, then empty arrays.
struct FileScraper {
    path: PathBuf,
    batches: Mutex<VecDeque<Value>>,
    runs: AtomicUsize,
}

impl FileScraper {
    fn new(path: PathBuf, batches: Vec<Value>) -> Self {
        Self {
            path,
            batches: Mutex::new(batches.into()),
            runs: AtomicUsize::new(0),
        }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScraperTrigger for FileScraper {
    async fn run(&self) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let batch = self.batches.lock().unwrap().pop_front().unwrap_or(json!([]));
        std::fs::write(&self.path, batch.to_string())?;
        Ok(())
    }
}

/// Scraper that always fails.
struct BrokenScraper;

#[async_trait]
impl ScraperTrigger for BrokenScraper {
    async fn run(&self) -> Result<()> {
        anyhow::bail!("chromedriver exited with status 1")
    }
}

fn record(team1: &str, odd1: &str, odd2: f64) -> Value {
    json!({
        "profit": "0.48%",
        "sport": "Baseball",
        "event_time": "Jul 04, 10:35",
        "bookmaker1": "Nairabet",
        "team1_bk1": team1,
        "team2_bk1": "Fubon Guardians",
        "league_bk1": "CPBL",
        "bet_type_bk1": "DNB1",
        "odd_bk1": odd1,
        "link_bk1": "https://nairabet.example/event/42",
        "bookmaker2": "Leon",
        "team1_bk2": team1,
        "team2_bk2": "Fubon Guardians",
        "league_bk2": "CPBL",
        "bet_type_bk2": "DNB2",
        "odd_bk2": odd2,
        "link_bk2": "https://leon.example/event/42",
    })
}

struct Harness {
    scheduler: Scheduler,
    nairabet: Arc<MockBookmaker>,
    leon: Arc<MockBookmaker>,
    audit: AuditLog,
}

fn harness(
    opportunities_file: PathBuf,
    scraper: Option<Arc<dyn ScraperTrigger>>,
    max_per_cycle: usize,
) -> Harness {
    let nairabet = usd_account("nairabet", dec!(1000));
    let leon = usd_account("leon", dec!(1000));
    let executor = Arc::new(executor(nairabet.clone(), leon.clone()));
    let audit = AuditLog::new(temp_path("surebet_audit", "jsonl"));

    let scheduler = Scheduler::new(
        executor,
        scraper,
        Some(audit.clone()),
        SchedulerConfig {
            max_opportunities_per_cycle: max_per_cycle,
            idle_wait: Duration::from_secs(300),
            opportunity_delay: Duration::from_secs(10),
            opportunities_file,
            tick: Duration::from_secs(1),
        },
    );
    Harness {
        scheduler,
        nairabet,
        leon,
        audit,
    }
}

#[tokio::test(start_paused = true)]
async fn test_cycle_takes_first_n_valid_opportunities_in_order() {
    let file = temp_path("surebet_opps", "json");
    let records = json!([
        record("Rakuten Monkeys", "2.10", 2.20),
        record("unknown", "2.10", 2.20),
        record("Uni-President Lions", "2.05", 2.25),
        record("CTBC Brothers", "2.15", 2.15),
    ]);
    std::fs::write(&file, records.to_string()).unwrap();

    let h = harness(file.clone(), None, 2);
    let started = tokio::time::Instant::now();
    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.opportunities_found, 3);
    assert_eq!(report.stats.attempted, 2);
    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.stats.failed, 0);
    assert!(report.processed_any());
    // One delay between the two opportunities, none after the last.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));

    let first = h.nairabet.placed();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].team1, "Rakuten Monkeys");
    assert_eq!(first[1].team1, "Uni-President Lions");
    assert_eq!(h.leon.placed().len(), 2);

    let audit = tokio_test::assert_ok!(h.audit.read_all());
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].status, CycleStatus::Completed);
    assert!(audit[0].summary.leg1_placed && audit[0].summary.leg2_placed);
    assert_eq!(audit[1].opportunity.legs[0].team1, "Uni-President Lions");

    let status = h.scheduler.status().await;
    assert_eq!(status.cycles_completed, 1);
    assert_eq!(status.totals.attempted, 2);

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

#[tokio::test]
async fn test_failed_scraper_still_reads_existing_file() {
    let file = temp_path("surebet_opps", "json");
    std::fs::write(&file, json!([record("Rakuten Monkeys", "2.10", 2.20)]).to_string()).unwrap();

    let h = harness(file.clone(), Some(Arc::new(BrokenScraper)), 3);
    let report = h.scheduler.run_cycle().await.unwrap();

    assert!(!report.scraper_ok);
    assert_eq!(report.opportunities_found, 1);
    assert_eq!(report.stats.succeeded, 1);

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

#[tokio::test]
async fn test_malformed_file_is_treated_as_empty() {
    let file = temp_path("surebet_opps", "json");
    std::fs::write(&file, "{ not json").unwrap();

    let h = harness(file.clone(), None, 3);
    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.opportunities_found, 0);
    assert_eq!(report.stats.attempted, 0);
    assert!(h.nairabet.placed().is_empty());
    assert!(h.audit.read_all().unwrap().is_empty());

    let _ = std::fs::remove_file(&file);
}

#[tokio::test]
async fn test_aborted_opportunity_counts_as_failed() {
    let file = temp_path("surebet_opps", "json");
    std::fs::write(&file, json!([record("Rakuten Monkeys", "2.10", 2.20)]).to_string()).unwrap();

    let h = harness(file.clone(), None, 3);
    h.leon.set_logged_in(false);
    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.stats.attempted, 1);
    assert_eq!(report.stats.failed, 1);
    let audit = h.audit.read_all().unwrap();
    assert!(matches!(audit[0].status, CycleStatus::Aborted { .. }));

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

#[tokio::test(start_paused = true)]
async fn test_loop_runs_again_immediately_then_idles_until_stopped() {
    let file = temp_path("surebet_opps", "json");
    let scraper = Arc::new(FileScraper::new(
        file.clone(),
        vec![json!([record("Rakuten Monkeys", "2.10", 2.20)])],
    ));
    let h = harness(file.clone(), Some(scraper.clone()), 3);

    h.scheduler.start().await.unwrap();
    assert_eq!(h.scheduler.start().await, Err(SchedulerError::AlreadyRunning));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(h.scheduler.status().await.running);
    h.scheduler.stop().unwrap();
    h.scheduler.join().await;

    // Cycle 1 placed the opportunity, cycle 2 found nothing and idled.
    let status = h.scheduler.status().await;
    assert!(!status.running);
    assert_eq!(status.cycles_completed, 2);
    assert_eq!(status.totals.attempted, 1);
    assert_eq!(scraper.runs(), 2);
    assert_eq!(h.nairabet.placed().len(), 1);

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

#[tokio::test]
async fn test_panicking_adapter_is_recorded_as_internal_abort() {
    let file = temp_path("surebet_opps", "json");
    std::fs::write(&file, json!([record("Rakuten Monkeys", "2.10", 2.20)]).to_string()).unwrap();

    let h = harness(file.clone(), None, 3);
    h.nairabet.set_placement(Placement::Panic("bet slip vanished".into()));
    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.stats.attempted, 1);
    assert_eq!(report.stats.failed, 1);
    let audit = h.audit.read_all().unwrap();
    match &audit[0].status {
        CycleStatus::Aborted { phase, kind, reason } => {
            assert_eq!(*phase, Phase::Abort);
            assert_eq!(*kind, AbortKind::Internal);
            assert!(reason.contains("panicked"));
        }
        CycleStatus::Completed => panic!("expected abort"),
    }

    // The cycle lock was released, so the next cycle runs normally.
    h.nairabet.set_placement(Placement::Confirm);
    let report = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(report.stats.succeeded, 1);

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_panicking_adapter() {
    let file = temp_path("surebet_opps", "json");
    let scraper = Arc::new(FileScraper::new(
        file.clone(),
        vec![
            json!([record("Rakuten Monkeys", "2.10", 2.20)]),
            json!([]),
            json!([record("CTBC Brothers", "2.10", 2.20)]),
        ],
    ));
    let h = harness(file.clone(), Some(scraper.clone()), 3);
    h.nairabet.set_placement(Placement::Panic("bet slip vanished".into()));

    h.scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let status = h.scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.cycles_completed, 2);
    assert_eq!(status.totals.failed, 1);

    // After the idle wait the loop picks up the next batch.
    h.nairabet.set_placement(Placement::Confirm);
    tokio::time::sleep(Duration::from_secs(300)).await;

    let status = h.scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.cycles_completed, 4);
    assert_eq!(status.totals.attempted, 2);
    assert_eq!(status.totals.succeeded, 1);

    h.scheduler.stop().unwrap();
    h.scheduler.join().await;
    assert!(!h.scheduler.status().await.running);

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

#[tokio::test(start_paused = true)]
async fn test_empty_cycle_waits_full_idle_interval() {
    let file = temp_path("surebet_opps", "json");
    let scraper = Arc::new(FileScraper::new(
        file.clone(),
        vec![json!([record("Rakuten Monkeys", "2.10", 2.20)])],
    ));
    let h = harness(file.clone(), Some(scraper.clone()), 3);

    h.scheduler.start().await.unwrap();

    // Cycle 1 placed, cycle 2 found nothing and started a 300s wait.
    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(h.scheduler.status().await.cycles_completed, 2);
    assert_eq!(scraper.runs(), 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.scheduler.status().await.cycles_completed, 3);
    assert_eq!(scraper.runs(), 3);

    h.scheduler.stop().unwrap();
    h.scheduler.join().await;

    let _ = std::fs::remove_file(&file);
    let _ = std::fs::remove_file(h.audit.path());
}

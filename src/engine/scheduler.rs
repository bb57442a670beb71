//! Opportunity scheduler: the outer control loop.
//!
//! One cycle = trigger the scraper, load the opportunity file, take up to N
//! opportunities in file order and drive each through the executor with a
//! fixed delay between them. With nothing to do the loop idles, checking
//! the stop flag once per tick. `stop` is cooperative: an in-flight cycle
//! always runs to completion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::executor::ArbitrageExecutor;
use super::scraper::ScraperTrigger;
use crate::storage::{load_opportunities, AuditLog};
use crate::types::{CycleResult, Opportunity};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_opportunities_per_cycle: usize,
    /// Wait after a cycle that found nothing.
    pub idle_wait: Duration,
    /// Pause between two opportunities of the same cycle.
    pub opportunity_delay: Duration,
    pub opportunities_file: PathBuf,
    /// Granularity of the idle wait (stop-flag polling).
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_opportunities_per_cycle: 3,
            idle_wait: Duration::from_secs(300),
            opportunity_delay: Duration::from_secs(10),
            opportunities_file: PathBuf::from("filtered_opportunities.json"),
            tick: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports & status
// ---------------------------------------------------------------------------

/// Per-cycle (or cumulative) opportunity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Opportunities driven through the executor.
    pub attempted: u64,
    /// Both legs placed.
    pub succeeded: u64,
    /// Aborted, or at least one leg not placed.
    pub failed: u64,
    /// Exactly one leg placed.
    pub one_sided: u64,
}

impl CycleStats {
    fn record(&mut self, result: &CycleResult) {
        self.attempted += 1;
        if result.both_placed() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        if result.is_one_sided() {
            self.one_sided += 1;
        }
    }

    fn absorb(&mut self, other: &CycleStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.one_sided += other.one_sided;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scraper_ok: bool,
    pub opportunities_found: usize,
    pub stats: CycleStats,
}

impl CycleReport {
    /// Whether the cycle had anything to process.
    pub fn processed_any(&self) -> bool {
        self.stats.attempted > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    /// A cycle is executing right now.
    pub in_cycle: bool,
    pub cycles_completed: u64,
    pub totals: CycleStats,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,
    #[error("Scheduler is not running")]
    NotRunning,
    #[error("Previous loop is still finishing its cycle")]
    StillStopping,
    #[error("A cycle is already in progress")]
    Busy,
}

#[derive(Debug, Default)]
struct SchedulerState {
    totals: CycleStats,
    last_cycle: Option<CycleReport>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Inner {
    executor: Arc<ArbitrageExecutor>,
    scraper: Option<Arc<dyn ScraperTrigger>>,
    audit: Option<AuditLog>,
    config: SchedulerConfig,
    running: AtomicBool,
    cycles: AtomicU64,
    cycle_lock: Mutex<()>,
    state: RwLock<SchedulerState>,
}

pub struct Scheduler {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        executor: Arc<ArbitrageExecutor>,
        scraper: Option<Arc<dyn ScraperTrigger>>,
        audit: Option<AuditLog>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                scraper,
                audit,
                config,
                running: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                cycle_lock: Mutex::new(()),
                state: RwLock::new(SchedulerState::default()),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Spawn the control loop and return immediately.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock().await;
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(SchedulerError::StillStopping);
        }

        self.inner.running.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(async move { inner.run_loop().await }));
        info!("Scheduler started");
        Ok(())
    }

    /// Ask the loop to stop. The current cycle, if any, finishes first.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        info!("Scheduler stop requested");
        Ok(())
    }

    /// Wait for the loop task to exit (after `stop`).
    pub async fn join(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop task failed");
            }
        }
    }

    /// Run exactly one cycle in the caller's task. Only while stopped.
    pub async fn run_cycle(&self) -> Result<CycleReport, SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::Busy);
        }
        let _guard = self
            .inner
            .cycle_lock
            .try_lock()
            .map_err(|_| SchedulerError::Busy)?;
        Ok(self.inner.cycle().await)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.read().await;
        SchedulerStatus {
            running: self.is_running(),
            in_cycle: self.inner.cycle_lock.try_lock().is_err(),
            cycles_completed: self.inner.cycles.load(Ordering::SeqCst),
            totals: state.totals.clone(),
            last_cycle: state.last_cycle.clone(),
        }
    }
}

impl Inner {
    async fn run_loop(self: Arc<Self>) {
        info!(
            max_per_cycle = self.config.max_opportunities_per_cycle,
            idle_wait_secs = self.config.idle_wait.as_secs(),
            "Scheduler loop running"
        );

        let _running = RunningGuard(&self.running);

        while self.running.load(Ordering::SeqCst) {
            let outcome = {
                let _guard = self.cycle_lock.lock().await;
                let inner = self.clone();
                tokio::spawn(async move { inner.cycle().await }).await
            };

            match outcome {
                Ok(report) if report.processed_any() => {
                    info!(cycle = report.cycle, "Opportunities processed, starting next cycle");
                    continue;
                }
                Ok(report) => info!(
                    cycle = report.cycle,
                    wait_secs = self.config.idle_wait.as_secs(),
                    "No opportunities, waiting before next cycle"
                ),
                Err(e) => error!(
                    error = %e,
                    wait_secs = self.config.idle_wait.as_secs(),
                    "Cycle task failed, waiting before next cycle"
                ),
            }
            self.idle_wait().await;
        }

        info!("Scheduler loop stopped");
    }

    /// Sleep for the idle interval in ticks, returning early on stop.
    async fn idle_wait(&self) {
        let tick = self.config.tick.max(Duration::from_millis(1));
        let mut waited = Duration::ZERO;
        while waited < self.config.idle_wait {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(tick).await;
            waited += tick;
        }
    }

    async fn cycle(&self) -> CycleReport {
        let cycle = self.cycles.load(Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        info!(cycle, "Starting cycle");

        let scraper_ok = match self.scraper {
            Some(ref scraper) => match scraper.run().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Scraper run failed, checking existing opportunities");
                    false
                }
            },
            None => true,
        };

        let opportunities = load_opportunities(&self.config.opportunities_file).unwrap_or_else(|e| {
            error!(error = format!("{e:#}"), "Failed to load opportunities");
            Vec::new()
        });

        let mut stats = CycleStats::default();
        if opportunities.is_empty() {
            info!(cycle, "No opportunities found");
        } else {
            let selected: Vec<_> = opportunities
                .iter()
                .take(self.config.max_opportunities_per_cycle)
                .collect();
            info!(
                cycle,
                selected = selected.len(),
                available = opportunities.len(),
                "Processing opportunities"
            );

            for (i, opportunity) in selected.iter().enumerate() {
                if i > 0 && !self.config.opportunity_delay.is_zero() {
                    tokio::time::sleep(self.config.opportunity_delay).await;
                }
                let result = self.execute_isolated(opportunity).await;
                stats.record(&result);

                if let Some(ref audit) = self.audit {
                    if let Err(e) = audit.append(&result) {
                        error!(error = format!("{e:#}"), "Failed to write audit record");
                    }
                }
            }

            info!(
                cycle,
                succeeded = stats.succeeded,
                failed = stats.failed,
                one_sided = stats.one_sided,
                "Cycle completed"
            );
        }

        let report = CycleReport {
            cycle,
            started_at,
            finished_at: Utc::now(),
            scraper_ok,
            opportunities_found: opportunities.len(),
            stats,
        };

        self.cycles.store(cycle, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.totals.absorb(&report.stats);
        state.last_cycle = Some(report.clone());
        report
    }

    /// Run one opportunity in its own task so a panic inside an adapter
    /// becomes an `Internal` abort instead of taking the cycle down.
    async fn execute_isolated(&self, opportunity: &Opportunity) -> CycleResult {
        let started_at = Utc::now();
        let executor = self.executor.clone();
        let owned = opportunity.clone();

        match tokio::spawn(async move { executor.execute(&owned).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    teams = %opportunity.matchup(),
                    error = %e,
                    "Opportunity execution panicked, check both bookmaker accounts"
                );
                CycleResult::crashed(
                    opportunity.clone(),
                    started_at,
                    format!("execution panicked: {e}; leg state unknown, reconcile manually"),
                )
            }
        }
    }
}

/// Clears the running flag when the loop exits, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

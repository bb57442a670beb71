//! Persistence layer.
//!
//! Two files: the opportunity list the scraper writes (read-only here) and
//! an append-only JSONL audit log with one record per processed
//! opportunity. Nothing else is persisted.

pub mod opportunities;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::types::{CycleResult, CycleStatus, CycleSummary, LegOutcome, Opportunity, StakeAllocation};

pub use opportunities::load_opportunities;

/// Default audit log path.
pub const DEFAULT_AUDIT_FILE: &str = "surebet_audit.jsonl";

/// One line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub cycle_id: Uuid,
    pub opportunity: Opportunity,
    pub allocation: Option<StakeAllocation>,
    pub outcomes: Option<[LegOutcome; 2]>,
    pub status: CycleStatus,
    pub summary: CycleSummary,
}

impl From<&CycleResult> for AuditRecord {
    fn from(result: &CycleResult) -> Self {
        Self {
            timestamp: result.finished_at,
            cycle_id: result.id,
            opportunity: result.opportunity.clone(),
            allocation: result.allocation.clone(),
            outcomes: result.outcomes.clone(),
            status: result.status.clone(),
            summary: result.summary(),
        }
    }
}

/// Append-only audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record for `result`.
    pub fn append(&self, result: &CycleResult) -> Result<()> {
        let record = AuditRecord::from(result);
        let mut line = serde_json::to_string(&record).context("Failed to serialise audit record")?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to audit log {}", self.path.display()))?;

        debug!(path = %self.path.display(), cycle_id = %result.id, "Audit record appended");
        Ok(())
    }

    /// Read every record back, oldest first. A missing log is empty.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read audit log {}", self.path.display()))?;

        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Bad audit record at line {}", i + 1))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Run report aggregation.

use crate::governor::{BatchOutcome, StageReport};
use catsync_types::{CatalogEntity, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

/// Totals for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    /// Entities the target reported as completed.
    pub succeeded: u64,
    /// Entities the target reported as failed, plus rejected batches.
    pub errored: u64,
    /// Source entities seen, or target items listed on the wipe path.
    pub total_items: u64,
    /// Every variant of every entity seen, eligible or not.
    pub total_variants: u64,
    /// Batch jobs dispatched.
    pub total_events: u64,
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// Wall time of the run.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Run-scoped accumulator. One per run, owned by that run.
#[derive(Debug)]
pub struct ReportAggregator {
    run_id: RunId,
    started_at: DateTime<Utc>,
    started: Instant,
    succeeded: u64,
    errored: u64,
    total_items: u64,
    total_variants: u64,
    total_events: u64,
}

impl ReportAggregator {
    /// Starts the clock for `run_id`.
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            started: Instant::now(),
            succeeded: 0,
            errored: 0,
            total_items: 0,
            total_variants: 0,
            total_events: 0,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Counts the entities and variants of one source page.
    pub fn record_page(&mut self, entities: &[CatalogEntity]) {
        self.total_items += entities.len() as u64;
        self.total_variants += entities.iter().map(|e| e.variants.len() as u64).sum::<u64>();
    }

    /// Counts target items listed by the wipe path.
    pub fn record_listed(&mut self, count: usize) {
        self.total_items += count as u64;
    }

    /// Folds a whole stage.
    pub fn fold_stage(&mut self, stage: &StageReport) {
        self.fold_outcomes(&stage.outcomes);
    }

    /// Folds dispatched batch outcomes. Rate-limited batches count toward
    /// `total_events` only.
    pub fn fold_outcomes(&mut self, outcomes: &[BatchOutcome]) {
        for outcome in outcomes {
            self.total_events += 1;
            match outcome {
                BatchOutcome::Fulfilled { receipt, .. } => {
                    self.succeeded += receipt.completed;
                    self.errored += receipt.failed;
                }
                BatchOutcome::Rejected { .. } => self.errored += 1,
                BatchOutcome::RateLimited { .. } => {}
            }
        }
    }

    /// Current totals without finishing the run.
    pub fn snapshot(&self) -> SyncReport {
        SyncReport {
            run_id: self.run_id,
            started_at: self.started_at,
            succeeded: self.succeeded,
            errored: self.errored,
            total_items: self.total_items,
            total_variants: self.total_variants,
            total_events: self.total_events,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Finalizes the report and logs the run summary.
    pub fn finish(self) -> SyncReport {
        let report = self.snapshot();
        info!(
            "Run {} finished: {} items, {} variants, {} events, {} succeeded, {} errored in {:?}",
            report.run_id,
            report.total_items,
            report.total_variants,
            report.total_events,
            report.succeeded,
            report.errored,
            report.elapsed()
        );
        report
    }
}

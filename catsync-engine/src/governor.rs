//! Dispatch and rate-limit governor.
//!
//! A stage is a set of batches sent as a bounded concurrent fan-out. Every
//! batch is awaited, success or failure, before the stage completes; one
//! failing batch never cancels its siblings. After the stage, if any batch
//! was throttled, the governor pauses exactly once before returning, using
//! the largest retry-after hint seen (or the configured default), capped at
//! the configured maximum.

use crate::config::RateLimitConfig;
use crate::error::DispatchError;
use crate::ports::{DispatchReceipt, Dispatcher};
use async_trait::async_trait;
use catsync_types::{BatchJob, JobKind};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Suspends the run between stages.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// What happened to one dispatched batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The target accepted the batch and reported per-entity counts.
    Fulfilled {
        kind: JobKind,
        size: usize,
        receipt: DispatchReceipt,
    },
    /// The target throttled the batch.
    RateLimited {
        kind: JobKind,
        size: usize,
        retry_after: Option<Duration>,
    },
    /// The batch failed for any other reason.
    Rejected {
        kind: JobKind,
        size: usize,
        error: DispatchError,
    },
}

impl BatchOutcome {
    /// Classifies a dispatcher result.
    pub fn from_result(batch: &BatchJob, result: Result<DispatchReceipt, DispatchError>) -> Self {
        let kind = batch.kind;
        let size = batch.len();
        match result {
            Ok(receipt) => BatchOutcome::Fulfilled {
                kind,
                size,
                receipt,
            },
            Err(error) if error.is_rate_limited() => BatchOutcome::RateLimited {
                kind,
                size,
                retry_after: error.retry_after(),
            },
            Err(error) => BatchOutcome::Rejected { kind, size, error },
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, BatchOutcome::Fulfilled { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BatchOutcome::RateLimited { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, BatchOutcome::Rejected { .. })
    }
}

/// Result of one dispatch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// Stage label used in logs.
    pub name: String,
    /// One outcome per batch, in batch order.
    pub outcomes: Vec<BatchOutcome>,
    /// The pause applied after the stage, if any.
    pub pause: Option<Duration>,
}

impl StageReport {
    pub fn fulfilled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fulfilled()).count()
    }

    pub fn rate_limited(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_rate_limited()).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_rejected()).count()
    }
}

/// Sends stages of batches and paces between them.
#[derive(Clone)]
pub struct DispatchGovernor {
    dispatcher: Arc<dyn Dispatcher>,
    pacer: Arc<dyn Pacer>,
    concurrency: usize,
    rate_limit: RateLimitConfig,
}

impl DispatchGovernor {
    /// Creates a governor that sleeps on the tokio timer.
    pub fn new(dispatcher: Arc<dyn Dispatcher>, rate_limit: RateLimitConfig) -> Self {
        Self {
            dispatcher,
            pacer: Arc::new(TokioPacer),
            concurrency: 10,
            rate_limit,
        }
    }

    /// Replaces the pacer.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Sets how many batches may be in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sends every batch and waits for all of them.
    pub async fn dispatch(&self, batches: &[BatchJob]) -> Vec<BatchOutcome> {
        let sends: Vec<_> = batches
            .iter()
            .map(|batch: &BatchJob| async move {
                let result = self.dispatcher.send(batch).await;
                BatchOutcome::from_result(batch, result)
            })
            .collect();
        stream::iter(sends)
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// The pause owed after a stage with these outcomes, if any.
    pub fn pause_for(&self, outcomes: &[BatchOutcome]) -> Option<Duration> {
        let mut throttled = false;
        let mut hint: Option<Duration> = None;
        for outcome in outcomes {
            if let BatchOutcome::RateLimited { retry_after, .. } = outcome {
                throttled = true;
                hint = hint.max(*retry_after);
            }
        }
        throttled.then(|| {
            hint.unwrap_or_else(|| self.rate_limit.default_delay())
                .min(self.rate_limit.max_delay())
        })
    }

    /// Runs one stage: dispatch, log, and pause once if throttled.
    pub async fn run_stage(&self, name: &str, batches: &[BatchJob]) -> StageReport {
        if batches.is_empty() {
            debug!("Stage {} has no batches", name);
            return StageReport {
                name: name.to_string(),
                outcomes: Vec::new(),
                pause: None,
            };
        }

        let outcomes = self.dispatch(batches).await;
        for outcome in &outcomes {
            if let BatchOutcome::Rejected { kind, size, error } = outcome {
                error!("Error syncing {} batch of {} entries: {}", kind, size, error);
            }
        }

        let report = StageReport {
            name: name.to_string(),
            pause: self.pause_for(&outcomes),
            outcomes,
        };
        info!(
            "Stage {}: {} batches, {} fulfilled, {} rate limited, {} rejected",
            name,
            batches.len(),
            report.fulfilled(),
            report.rate_limited(),
            report.rejected()
        );

        if let Some(delay) = report.pause {
            warn!("Rate limited during stage {}, pausing for {:?}", name, delay);
            self.pacer.pause(delay).await;
        }
        report
    }
}

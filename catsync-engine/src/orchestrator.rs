//! Sync orchestrator, the top-level control flow of a run.
//!
//! A bulk run takes the single-flight lock, walks the source catalog page by
//! page through the diff engine, then groups the accumulated requests and
//! dispatches them in three stages: items, variant deletions, then variant
//! creates and updates. The full wipe walks the target's own listing instead
//! and deletes every item. Both paths share one lock key and release it on
//! every exit except contention.

use crate::config::SyncConfig;
use crate::diff::DiffEngine;
use crate::error::{LockError, SyncError, SyncResult};
use crate::governor::{DispatchGovernor, Pacer, StageReport};
use crate::grouper::GroupedBatches;
use crate::incremental::EventProcessor;
use crate::keys::{KeyFormatter, PrefixKeyFormatter};
use crate::lock::{LockGuard, LockStore};
use crate::mapper::{CatalogMapper, JsonApiMapper};
use crate::ports::{SourceFetcher, TargetPorts};
use crate::report::{ReportAggregator, SyncReport};
use catsync_types::{BatchJob, JobKind, JobRequest, RunId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Kinds grouped by a bulk run, one entry per stage.
const STAGES: [(&str, &[JobKind]); 3] = [
    ("items", &[JobKind::ItemCreated, JobKind::ItemUpdated]),
    ("variant deletions", &[JobKind::VariantDeleted]),
    (
        "variant upserts",
        &[JobKind::VariantCreated, JobKind::VariantUpdated],
    ),
];

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run finished; every batch outcome is folded into the report.
    Completed(SyncReport),
    /// Another run held the lock. Nothing was fetched or dispatched.
    Skipped,
    /// A fatal error aborted the run after the lock was released.
    Failed {
        error: SyncError,
        /// Totals aggregated before the failure.
        partial: SyncReport,
    },
}

impl RunOutcome {
    /// The report, partial or complete, if the run started.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Failed { partial, .. } => Some(partial),
            RunOutcome::Skipped => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Drives bulk sync and full wipe runs.
#[derive(Clone)]
pub struct SyncOrchestrator {
    config: SyncConfig,
    lock: LockGuard,
    source: Arc<dyn SourceFetcher>,
    target: TargetPorts,
    keys: Arc<dyn KeyFormatter>,
    mapper: Arc<dyn CatalogMapper>,
    diff: DiffEngine,
    governor: DispatchGovernor,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with the default key format and mapper.
    pub fn new(
        config: SyncConfig,
        lock_store: Arc<dyn LockStore>,
        source: Arc<dyn SourceFetcher>,
        target: TargetPorts,
    ) -> SyncResult<Self> {
        config.validate()?;
        let keys: Arc<dyn KeyFormatter> = Arc::new(PrefixKeyFormatter::default());
        let mapper: Arc<dyn CatalogMapper> = Arc::new(JsonApiMapper::new(keys.clone()));
        let diff = build_diff(&config, &target, keys.clone(), mapper.clone());
        let governor = DispatchGovernor::new(target.dispatcher.clone(), config.rate_limit.clone())
            .with_concurrency(config.dispatch_concurrency);
        Ok(Self {
            lock: LockGuard::new(lock_store, config.lock_key.clone()),
            config,
            source,
            target,
            keys,
            mapper,
            diff,
            governor,
        })
    }

    /// Replaces the key format and mapper.
    pub fn with_mapping(
        mut self,
        keys: Arc<dyn KeyFormatter>,
        mapper: Arc<dyn CatalogMapper>,
    ) -> Self {
        self.diff = build_diff(&self.config, &self.target, keys.clone(), mapper.clone());
        self.keys = keys;
        self.mapper = mapper;
        self
    }

    /// Replaces the pacer used between stages.
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.governor = self.governor.with_pacer(pacer);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<dyn KeyFormatter> {
        &self.keys
    }

    pub fn diff_engine(&self) -> &DiffEngine {
        &self.diff
    }

    pub fn governor(&self) -> &DispatchGovernor {
        &self.governor
    }

    /// A processor for single change notifications sharing this
    /// orchestrator's diff engine and governor. It does not take the lock.
    pub fn event_processor(&self) -> EventProcessor {
        EventProcessor::new(self.diff.clone(), self.governor.clone(), &self.config)
    }

    /// Reconciles the whole source catalog into the target.
    pub async fn sync_all_products(&self) -> RunOutcome {
        let mut report = match self.begin("bulk sync").await {
            Ok(report) => report,
            Err(outcome) => return outcome,
        };
        let result = self.run_sync(&mut report).await;
        self.end("bulk sync", result, report).await
    }

    /// Deletes every item the target holds.
    pub async fn delete_all_products(&self) -> RunOutcome {
        let mut report = match self.begin("full wipe").await {
            Ok(report) => report,
            Err(outcome) => return outcome,
        };
        let result = self.run_wipe(&mut report).await;
        self.end("full wipe", result, report).await
    }

    /// Releases the run lock regardless of who holds it.
    pub async fn release_lock_externally(&self) -> Result<(), LockError> {
        warn!("Releasing lock {} externally", self.lock.key());
        self.lock.release().await
    }

    // ── Run lifecycle ────────────────────────────────────────────

    async fn begin(&self, label: &str) -> Result<ReportAggregator, RunOutcome> {
        let run_id = RunId::new();
        match self.lock.acquire().await {
            Ok(token) => {
                info!("Starting {} run {} (lock {} at {})", label, run_id, token.key, token.acquired_at);
                Ok(ReportAggregator::new(run_id))
            }
            Err(LockError::Held(key)) => {
                info!("Skipping {}: lock {} is held by another run", label, key);
                Err(RunOutcome::Skipped)
            }
            Err(err) => {
                error!("Could not acquire lock for {}: {}", label, err);
                Err(RunOutcome::Failed {
                    error: err.into(),
                    partial: ReportAggregator::new(run_id).snapshot(),
                })
            }
        }
    }

    async fn end(
        &self,
        label: &str,
        result: SyncResult<()>,
        report: ReportAggregator,
    ) -> RunOutcome {
        if let Err(err) = self.lock.release().await {
            error!("Failed to release lock {} after {}: {}", self.lock.key(), label, err);
        }
        match result {
            Ok(()) => RunOutcome::Completed(report.finish()),
            Err(error) => {
                error!("{} run {} aborted: {}", label, report.run_id(), error);
                RunOutcome::Failed {
                    error,
                    partial: report.finish(),
                }
            }
        }
    }

    // ── Bulk sync ────────────────────────────────────────────────

    async fn run_sync(&self, report: &mut ReportAggregator) -> SyncResult<()> {
        let mut requests: Vec<JobRequest> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.source.get_page(cursor.as_deref()).await?;
            pages += 1;
            report.record_page(&page.entities);

            let diff = self.diff.classify_page(&page.entities).await?;
            debug!(
                "Page {}: {} entities, {} item requests, {} variant requests",
                pages,
                page.entities.len(),
                diff.items.len(),
                diff.variants.len()
            );
            requests.extend(diff.items);
            requests.extend(diff.variants);

            if !page.has_more {
                break;
            }
            cursor = match page.last_id {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => Some(next),
                other => {
                    return Err(SyncError::Contract(format!(
                        "source reported more pages but cursor did not advance ({:?})",
                        other
                    )));
                }
            };
        }

        info!("Classified {} pages into {} requests", pages, requests.len());
        dispatch_staged(&self.governor, requests, self.config.max_batch_size, report).await;
        Ok(())
    }

    // ── Full wipe ────────────────────────────────────────────────

    async fn run_wipe(&self, report: &mut ReportAggregator) -> SyncResult<()> {
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.target.lister.list_items(cursor.as_deref()).await?;
            pages += 1;
            report.record_listed(page.items.len());

            let batches: Vec<BatchJob> = page
                .items
                .iter()
                .map(|item| {
                    BatchJob::new(JobKind::ItemDeleted, vec![self.mapper.map_item_deletion(&item.id)])
                })
                .collect();
            let stage = self
                .governor
                .run_stage(&format!("deletions page {pages}"), &batches)
                .await;
            report.fold_stage(&stage);

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(next) => {
                    return Err(SyncError::Contract(format!(
                        "target listing returned the same cursor twice ({next})"
                    )));
                }
                None => break,
            }
        }
        Ok(())
    }
}

/// Groups `requests` and dispatches them in stage order, folding every stage
/// into `report`.
pub(crate) async fn dispatch_staged(
    governor: &DispatchGovernor,
    requests: Vec<JobRequest>,
    max_batch_size: usize,
    report: &mut ReportAggregator,
) -> Vec<StageReport> {
    let mut grouped = GroupedBatches::group(requests, &JobKind::ALL, max_batch_size);
    let mut stages = Vec::with_capacity(STAGES.len());
    for (name, kinds) in STAGES {
        let batches: Vec<BatchJob> = kinds.iter().flat_map(|k| grouped.take(*k)).collect();
        let stage = governor.run_stage(name, &batches).await;
        report.fold_stage(&stage);
        stages.push(stage);
    }
    stages
}

fn build_diff(
    config: &SyncConfig,
    target: &TargetPorts,
    keys: Arc<dyn KeyFormatter>,
    mapper: Arc<dyn CatalogMapper>,
) -> DiffEngine {
    DiffEngine::new(target.items.clone(), target.variants.clone(), keys, mapper)
        .with_update_policy(config.update_policy)
        .with_lookup_concurrency(config.lookup_concurrency)
}

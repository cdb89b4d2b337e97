//! Incremental event processing.
//!
//! Applies one change notification from the source catalog without taking
//! the bulk lock. A published entity goes through the same diff, grouping and
//! staged dispatch as a bulk page of one; unpublished and deleted entities
//! become a single item deletion.

use crate::config::SyncConfig;
use crate::diff::DiffEngine;
use crate::error::SyncResult;
use crate::governor::{BatchOutcome, DispatchGovernor, StageReport};
use crate::orchestrator::dispatch_staged;
use crate::report::{ReportAggregator, SyncReport};
use catsync_types::{BatchJob, CatalogEntity, EntityId, JobKind, RunId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// A change notification from the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CatalogEvent {
    /// The entity has a new published representation.
    EntityPublished(CatalogEntity),
    /// The entity lost its published representation.
    EntityUnpublished { id: EntityId },
    /// The entity was removed from the source.
    EntityDeleted { id: EntityId },
}

impl CatalogEvent {
    /// Id of the entity the event is about.
    pub fn entity_id(&self) -> &EntityId {
        match self {
            CatalogEvent::EntityPublished(entity) => &entity.id,
            CatalogEvent::EntityUnpublished { id } | CatalogEvent::EntityDeleted { id } => id,
        }
    }
}

/// Coarse result of processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Every batch was accepted without per-entity failures.
    Ok,
    /// At least one batch was throttled.
    RateLimited,
    /// A batch was rejected, reported failures, or a lookup failed.
    Failed,
}

impl EventStatus {
    fn from_stages(stages: &[StageReport]) -> Self {
        let outcomes = stages.iter().flat_map(|s| s.outcomes.iter());
        let mut status = EventStatus::Ok;
        for outcome in outcomes {
            match outcome {
                BatchOutcome::RateLimited { .. } => return EventStatus::RateLimited,
                BatchOutcome::Rejected { .. } => status = EventStatus::Failed,
                BatchOutcome::Fulfilled { receipt, .. } if receipt.failed > 0 => {
                    status = EventStatus::Failed
                }
                BatchOutcome::Fulfilled { .. } => {}
            }
        }
        status
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub status: EventStatus,
    pub report: SyncReport,
    /// Set when classification failed before anything was dispatched.
    pub error: Option<String>,
}

/// Applies change notifications one at a time.
#[derive(Clone)]
pub struct EventProcessor {
    diff: DiffEngine,
    governor: DispatchGovernor,
    max_batch_size: usize,
}

impl EventProcessor {
    /// Creates a processor sharing the orchestrator's diff engine and governor.
    pub fn new(diff: DiffEngine, governor: DispatchGovernor, config: &SyncConfig) -> Self {
        Self {
            diff,
            governor,
            max_batch_size: config.max_batch_size,
        }
    }

    /// Processes one event.
    pub async fn process(&self, event: CatalogEvent) -> EventOutcome {
        let mut report = ReportAggregator::new(RunId::new());
        debug!("Processing event for entity {}", event.entity_id());

        let stages = match event {
            CatalogEvent::EntityPublished(entity) => {
                report.record_page(std::slice::from_ref(&entity));
                match self.published(&entity, &mut report).await {
                    Ok(stages) => stages,
                    Err(err) => {
                        error!("Failed to classify entity {}: {}", entity.id, err);
                        return EventOutcome {
                            status: EventStatus::Failed,
                            report: report.finish(),
                            error: Some(err.to_string()),
                        };
                    }
                }
            }
            CatalogEvent::EntityUnpublished { id } | CatalogEvent::EntityDeleted { id } => {
                report.record_listed(1);
                vec![self.removed(&id, &mut report).await]
            }
        };

        let status = EventStatus::from_stages(&stages);
        let report = report.finish();
        info!("Event processed with status {:?}", status);
        EventOutcome {
            status,
            report,
            error: None,
        }
    }

    async fn published(
        &self,
        entity: &CatalogEntity,
        report: &mut ReportAggregator,
    ) -> SyncResult<Vec<StageReport>> {
        let diff = self.diff.classify_page(std::slice::from_ref(entity)).await?;
        let requests = diff.items.into_iter().chain(diff.variants).collect();
        Ok(dispatch_staged(&self.governor, requests, self.max_batch_size, report).await)
    }

    async fn removed(&self, id: &EntityId, report: &mut ReportAggregator) -> StageReport {
        let key = self.diff.keys().item_key(id);
        let batch = BatchJob::new(
            JobKind::ItemDeleted,
            vec![self.diff.mapper().map_item_deletion(&key)],
        );
        let stage = self.governor.run_stage("item deletion", &[batch]).await;
        report.fold_stage(&stage);
        stage
    }
}

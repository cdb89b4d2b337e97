//! HTTP trigger API and configuration for the catsync service.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use catsync_engine::http::{HttpSourceConfig, HttpTargetConfig};
use catsync_engine::{CatalogEvent, EventStatus, RunOutcome, SyncConfig, SyncOrchestrator};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the service reads from its JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP port for the trigger API.
    pub port: u16,
    pub sync: SyncConfig,
    pub source: HttpSourceConfig,
    pub target: HttpTargetConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            sync: SyncConfig::default(),
            source: HttpSourceConfig::default(),
            target: HttpTargetConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads the config file, falling back to defaults for missing sections.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServiceConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.sync.validate().context("Invalid sync configuration")?;
        Ok(config)
    }
}

/// Reply to a trigger that started a background run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JobAccepted {
    pub job: String,
    pub status: String,
}

impl JobAccepted {
    fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            status: "accepted".to_string(),
        }
    }
}

/// Reply to an external lock release.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LockReleased {
    pub released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to an incremental event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventProcessed {
    pub status: EventStatus,
    pub succeeded: u64,
    pub errored: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<SyncOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }
}

const SYNC_JOB: &str = "productsSync";
const DELETE_JOB: &str = "productsDelete";

fn log_outcome(job: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(report) => info!(
            "{} completed: {} succeeded, {} errored, {} events",
            job, report.succeeded, report.errored, report.total_events
        ),
        RunOutcome::Skipped => info!("{} skipped, another run is in progress", job),
        RunOutcome::Failed { error, partial } => error!(
            "{} failed after {} events: {}",
            job, partial.total_events, error
        ),
    }
}

async fn sync_products(State(state): State<AppState>) -> (StatusCode, Json<JobAccepted>) {
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let outcome = orchestrator.sync_all_products().await;
        log_outcome(SYNC_JOB, &outcome);
    });
    (StatusCode::ACCEPTED, Json(JobAccepted::new(SYNC_JOB)))
}

async fn delete_products(State(state): State<AppState>) -> (StatusCode, Json<JobAccepted>) {
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let outcome = orchestrator.delete_all_products().await;
        log_outcome(DELETE_JOB, &outcome);
    });
    (StatusCode::ACCEPTED, Json(JobAccepted::new(DELETE_JOB)))
}

async fn release_lock(State(state): State<AppState>) -> (StatusCode, Json<LockReleased>) {
    match state.orchestrator.release_lock_externally().await {
        Ok(()) => (
            StatusCode::OK,
            Json(LockReleased {
                released: true,
                error: None,
            }),
        ),
        Err(err) => {
            warn!("External lock release failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LockReleased {
                    released: false,
                    error: Some(err.to_string()),
                }),
            )
        }
    }
}

async fn process_event(
    State(state): State<AppState>,
    Json(event): Json<CatalogEvent>,
) -> (StatusCode, Json<EventProcessed>) {
    let outcome = state.orchestrator.event_processor().process(event).await;
    let code = match outcome.status {
        EventStatus::Ok => StatusCode::OK,
        EventStatus::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        EventStatus::Failed => StatusCode::BAD_REQUEST,
    };
    (
        code,
        Json(EventProcessed {
            status: outcome.status,
            succeeded: outcome.report.succeeded,
            errored: outcome.report.errored,
            error: outcome.error,
        }),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the HTTP API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/sync/products", post(sync_products))
        .route("/sync/products/delete", post(delete_products))
        .route("/sync/lock/release", post(release_lock))
        .route("/sync/events", post(process_event))
        .route("/health", get(health))
        .with_state(state)
}

//! Catalog reconciliation and dispatch engine for catsync.
//!
//! Keeps a target platform's copy of a catalog consistent with an
//! authoritative source catalog, either as a bulk pass over the whole source
//! or one change notification at a time.
//!
//! # Architecture
//!
//! The engine never talks to a platform directly. Every source read, target
//! lookup and dispatch goes through the traits in [`ports`], so the HTTP
//! adapters in [`http`] and the in-memory fakes in [`ports::mock`] are
//! interchangeable.
//!
//! ## Components
//!
//! - **Lock**: single-flight guard shared by bulk sync and the full wipe
//! - **Diff**: classifies one source page against the target
//! - **Grouper**: packs classified requests into size-bounded batches
//! - **Governor**: fans batches out per stage and pauses when throttled
//! - **Report**: folds batch outcomes into run totals
//! - **Orchestrator**: drives a run end to end
//!
//! ## Bulk run
//!
//! 1. **Lock**: take the run lock, or skip if another run holds it
//! 2. **Classify**: page through the source, diffing each page
//! 3. **Group**: batch the accumulated requests per kind
//! 4. **Dispatch**: items, then variant deletions, then variant upserts
//! 5. **Report**: release the lock and return the totals
//!
//! # Example
//!
//! ```
//! use catsync_engine::ports::mock::{MockSource, MockTarget};
//! use catsync_engine::{InMemoryLockStore, SyncConfig, SyncOrchestrator, TargetPorts};
//! use std::sync::Arc;
//!
//! # async fn run() -> catsync_engine::SyncResult<()> {
//! let target = Arc::new(MockTarget::new());
//! let orchestrator = SyncOrchestrator::new(
//!     SyncConfig::default(),
//!     Arc::new(InMemoryLockStore::new()),
//!     Arc::new(MockSource::paged(Vec::new(), 100)),
//!     TargetPorts::from_shared(target),
//! )?;
//!
//! let outcome = orchestrator.sync_all_products().await;
//! assert!(outcome.is_completed());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diff;
mod error;
pub mod governor;
pub mod grouper;
pub mod http;
pub mod incremental;
pub mod keys;
pub mod lock;
pub mod mapper;
pub mod orchestrator;
pub mod ports;
pub mod report;

pub use config::{RateLimitConfig, SyncConfig, UpdatePolicy, DEFAULT_LOCK_KEY, MAX_BATCH_SIZE};
pub use diff::{DiffEngine, PageDiff};
pub use error::{DispatchError, LockError, SyncError, SyncResult};
pub use governor::{BatchOutcome, DispatchGovernor, Pacer, StageReport, TokioPacer};
pub use grouper::{group_into_batches, GroupedBatches};
pub use incremental::{CatalogEvent, EventOutcome, EventProcessor, EventStatus};
pub use keys::{KeyFormatter, PrefixKeyFormatter, DEFAULT_KEY_PREFIX};
pub use lock::{InMemoryLockStore, LockGuard, LockStore, LockToken};
pub use mapper::{CatalogMapper, JsonApiMapper};
pub use orchestrator::{RunOutcome, SyncOrchestrator};
pub use ports::{
    CatalogLister, DispatchReceipt, Dispatcher, ItemExistence, SourceFetcher, SourcePage,
    TargetPage, TargetPorts, TargetRecord, VariantExistence,
};
pub use report::{ReportAggregator, SyncReport};

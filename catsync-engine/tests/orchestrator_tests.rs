use async_trait::async_trait;
use catsync_engine::ports::mock::{listing_pages, MockSource, MockTarget, ScriptedOutcome};
use catsync_engine::ports::{SourceFetcher, SourcePage, TargetPage, TargetRecord};
use catsync_engine::{
    DispatchError, DispatchReceipt, InMemoryLockStore, LockStore, Pacer, RunOutcome, SyncConfig,
    SyncError, SyncOrchestrator, SyncResult, TargetPorts, DEFAULT_LOCK_KEY,
};
use catsync_types::{CatalogEntity, JobKind, Price, VariantRecord};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PREFIX: &str = "$custom:::$default:::";

#[derive(Default)]
struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, delay: Duration) {
        self.pauses.lock().unwrap().push(delay);
    }
}

/// Delays every page so concurrent runs overlap.
struct SlowSource(MockSource);

#[async_trait]
impl SourceFetcher for SlowSource {
    async fn get_page(&self, cursor: Option<&str>) -> SyncResult<SourcePage> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.0.get_page(cursor).await
    }
}

struct Harness {
    orchestrator: SyncOrchestrator,
    target: Arc<MockTarget>,
    locks: Arc<InMemoryLockStore>,
    pacer: Arc<RecordingPacer>,
}

fn key(id: &str) -> String {
    format!("{PREFIX}{id}")
}

fn eligible(sku: &str) -> VariantRecord {
    VariantRecord::new(sku)
        .with_price(Price::new("USD", 1000))
        .with_image(format!("https://img/{sku}.png"))
}

fn entity(id: &str, skus: &[&str]) -> CatalogEntity {
    skus.iter()
        .fold(CatalogEntity::new(id), |e, sku| e.with_variant(eligible(sku)))
}

fn harness_with(
    config: SyncConfig,
    source: Arc<dyn SourceFetcher>,
    target: MockTarget,
) -> Harness {
    let target = Arc::new(target);
    let locks = Arc::new(InMemoryLockStore::new());
    let pacer = Arc::new(RecordingPacer::default());
    let orchestrator = SyncOrchestrator::new(
        config,
        locks.clone(),
        source,
        TargetPorts::from_shared(target.clone()),
    )
    .unwrap()
    .with_pacer(pacer.clone());
    Harness {
        orchestrator,
        target,
        locks,
        pacer,
    }
}

fn harness(source: MockSource, target: MockTarget) -> Harness {
    harness_with(SyncConfig::default(), Arc::new(source), target)
}

fn completed(outcome: RunOutcome) -> catsync_engine::SyncReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    }
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn invalid_config_is_rejected() {
    let result = SyncOrchestrator::new(
        SyncConfig {
            max_batch_size: 0,
            ..Default::default()
        },
        Arc::new(InMemoryLockStore::new()),
        Arc::new(MockSource::default()),
        TargetPorts::from_shared(Arc::new(MockTarget::new())),
    );
    assert!(matches!(result, Err(SyncError::Config(_))));
}

// ── Bulk sync ────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_sync_dispatches_stages_in_order() {
    let source = MockSource::paged(
        vec![
            entity("new", &["n-1"]),
            entity("old", &["o-1", "o-2"]),
            entity("hidden", &["h-1"]).with_published(false),
        ],
        2,
    );
    let target = MockTarget::new()
        .with_items([key("old")])
        .with_variants(key("old"), [key("o-1"), key("gone")]);
    let h = harness(source, target);

    let report = completed(h.orchestrator.sync_all_products().await);

    let kinds: Vec<JobKind> = h.target.sent().iter().map(|b| b.kind).collect();
    assert_eq!(
        kinds,
        vec![
            JobKind::ItemCreated,
            JobKind::ItemUpdated,
            JobKind::VariantDeleted,
            JobKind::VariantCreated,
            JobKind::VariantUpdated,
        ]
    );
    assert_eq!(h.target.sent_of(JobKind::VariantCreated)[0].len(), 2);
    assert_eq!(h.target.sent_of(JobKind::VariantDeleted)[0].payload[0]["id"], key("gone"));

    assert_eq!(report.total_items, 3);
    assert_eq!(report.total_variants, 4);
    assert_eq!(report.total_events, 5);
    assert_eq!(report.succeeded, 6);
    assert_eq!(report.errored, 0);
    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
    assert!(h.pacer.pauses.lock().unwrap().is_empty());
}

#[tokio::test]
async fn requests_from_all_pages_share_batches() {
    let source = MockSource::paged(
        vec![entity("a", &["a-1"]), entity("b", &["b-1"]), entity("c", &["c-1"])],
        2,
    );
    let h = harness(source, MockTarget::new());
    completed(h.orchestrator.sync_all_products().await);

    assert_eq!(h.target.sent_of(JobKind::ItemCreated)[0].len(), 3);
}

#[tokio::test]
async fn cursors_chain_last_ids() {
    let source = Arc::new(MockSource::paged(
        vec![entity("a", &["a-1"]), entity("b", &["b-1"]), entity("c", &["c-1"])],
        2,
    ));
    let h = harness_with(SyncConfig::default(), source.clone(), MockTarget::new());
    completed(h.orchestrator.sync_all_products().await);
    assert_eq!(source.requested_cursors(), vec![None, Some("b".to_string())]);
}

#[tokio::test]
async fn batches_respect_max_batch_size() {
    let entities = (0..5).map(|i| entity(&format!("e{i}"), &["x"])).collect();
    let config = SyncConfig {
        max_batch_size: 2,
        ..Default::default()
    };
    let h = harness_with(config, Arc::new(MockSource::paged(entities, 10)), MockTarget::new());

    let report = completed(h.orchestrator.sync_all_products().await);

    let sizes: Vec<usize> = h
        .target
        .sent_of(JobKind::ItemCreated)
        .iter()
        .map(|b| b.len())
        .collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(report.succeeded, 10);
}

#[tokio::test]
async fn rate_limited_stage_pauses_before_next_stage() {
    let source = MockSource::paged(vec![entity("a", &["a-1"])], 10);
    let target = MockTarget::new().with_script(vec![ScriptedOutcome::Fail(
        DispatchError::RateLimited {
            retry_after: Some(Duration::from_secs(4)),
        },
    )]);
    let h = harness(source, target);

    let report = completed(h.orchestrator.sync_all_products().await);

    assert_eq!(*h.pacer.pauses.lock().unwrap(), vec![Duration::from_secs(4)]);
    assert_eq!(report.total_events, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.errored, 0);
}

#[tokio::test]
async fn partial_failures_are_reported() {
    let source = MockSource::paged(vec![entity("a", &["a-1", "a-2"])], 10);
    let target = MockTarget::new().with_script(vec![
        ScriptedOutcome::Accept(DispatchReceipt::new(1, 0)),
        ScriptedOutcome::Accept(DispatchReceipt::new(1, 1)),
    ]);
    let h = harness(source, target);

    let report = completed(h.orchestrator.sync_all_products().await);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.errored, 1);
}

// ── Lock handling ────────────────────────────────────────────────

#[tokio::test]
async fn held_lock_skips_without_side_effects() {
    let source = Arc::new(MockSource::paged(vec![entity("a", &["a-1"])], 10));
    let h = harness_with(SyncConfig::default(), source.clone(), MockTarget::new());
    h.locks.acquire(DEFAULT_LOCK_KEY).await.unwrap();

    let outcome = h.orchestrator.sync_all_products().await;

    assert!(outcome.is_skipped());
    assert!(outcome.report().is_none());
    assert!(h.target.sent().is_empty());
    assert!(source.requested_cursors().is_empty());
    assert!(h.locks.is_held(DEFAULT_LOCK_KEY).await);
}

#[tokio::test]
async fn held_lock_also_blocks_the_wipe() {
    let h = harness(MockSource::default(), MockTarget::new().with_listing(listing_pages(1, 3)));
    h.locks.acquire(DEFAULT_LOCK_KEY).await.unwrap();

    assert!(h.orchestrator.delete_all_products().await.is_skipped());
    assert!(h.target.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overlapping_runs_are_single_flight() {
    let source = SlowSource(MockSource::paged(vec![entity("a", &["a-1"])], 10));
    let h = harness_with(SyncConfig::default(), Arc::new(source), MockTarget::new());

    let (first, second) = tokio::join!(
        h.orchestrator.sync_all_products(),
        h.orchestrator.sync_all_products()
    );

    assert_eq!(
        [first.is_completed(), second.is_completed()].iter().filter(|c| **c).count(),
        1
    );
    assert!(first.is_skipped() || second.is_skipped());
    assert_eq!(h.target.sent_of(JobKind::ItemCreated).len(), 1);
    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
}

#[tokio::test]
async fn source_failure_releases_lock_and_keeps_partial() {
    let source = MockSource::paged(
        vec![entity("a", &["a-1"]), entity("b", &["b-1"]), entity("c", &["c-1"])],
        2,
    )
    .failing_at(1);
    let h = harness(source, MockTarget::new());

    let outcome = h.orchestrator.sync_all_products().await;

    match outcome {
        RunOutcome::Failed { error, partial } => {
            assert!(matches!(error, SyncError::Source(_)));
            assert_eq!(partial.total_items, 2);
            assert_eq!(partial.total_events, 0);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(h.target.sent().is_empty());
    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
}

#[tokio::test]
async fn lookup_failure_releases_lock() {
    let h = harness(
        MockSource::paged(vec![entity("a", &["a-1"])], 10),
        MockTarget::new().with_failing_lookups(),
    );

    let outcome = h.orchestrator.sync_all_products().await;

    assert!(outcome.is_failed());
    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
    assert!(h.orchestrator.sync_all_products().await.is_failed());
}

#[tokio::test]
async fn stalled_cursor_is_a_contract_violation() {
    let page = SourcePage {
        entities: vec![entity("a", &["a-1"])],
        last_id: None,
        has_more: true,
    };
    let h = harness(MockSource::from_pages(vec![page]), MockTarget::new());

    let outcome = h.orchestrator.sync_all_products().await;

    assert!(matches!(
        outcome,
        RunOutcome::Failed {
            error: SyncError::Contract(_),
            ..
        }
    ));
    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
}

#[tokio::test]
async fn external_release_frees_a_stranded_lock() {
    let h = harness(MockSource::paged(vec![entity("a", &["a-1"])], 10), MockTarget::new());
    h.locks.acquire(DEFAULT_LOCK_KEY).await.unwrap();

    h.orchestrator.release_lock_externally().await.unwrap();

    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
    assert!(h.orchestrator.sync_all_products().await.is_completed());
}

// ── Full wipe ────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_c_wipe_over_two_pages() {
    let h = harness(
        MockSource::default(),
        MockTarget::new().with_listing(listing_pages(2, 50)),
    );

    let report = completed(h.orchestrator.delete_all_products().await);

    let sent = h.target.sent();
    assert_eq!(sent.len(), 100);
    assert!(sent.iter().all(|b| b.kind == JobKind::ItemDeleted && b.len() == 1));
    assert_eq!(sent[0].payload[0]["id"], "item-0-0");
    assert_eq!(sent[99].payload[0]["id"], "item-1-49");
    assert_eq!(report.total_items, 100);
    assert_eq!(report.total_events, 100);
    assert_eq!(report.succeeded, 100);
    assert!(!h.locks.is_held(DEFAULT_LOCK_KEY).await);
}

#[tokio::test]
async fn wipe_pauses_between_throttled_pages() {
    let target = MockTarget::new()
        .with_listing(listing_pages(2, 2))
        .with_script(vec![ScriptedOutcome::Fail(DispatchError::RateLimited {
            retry_after: None,
        })]);
    let h = harness(MockSource::default(), target);

    let report = completed(h.orchestrator.delete_all_products().await);

    assert_eq!(*h.pacer.pauses.lock().unwrap(), vec![Duration::from_millis(1000)]);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.errored, 0);
}

#[tokio::test]
async fn empty_target_wipe_completes() {
    let h = harness(
        MockSource::default(),
        MockTarget::new().with_listing(vec![TargetPage {
            items: Vec::new(),
            next_cursor: None,
        }]),
    );
    let report = completed(h.orchestrator.delete_all_products().await);
    assert_eq!(report.total_items, 0);
    assert!(h.target.sent().is_empty());
}

#[tokio::test]
async fn repeated_listing_cursor_aborts_wipe() {
    let looping = TargetPage {
        items: vec![TargetRecord::new("x")],
        next_cursor: Some("0".into()),
    };
    let h = harness(MockSource::default(), MockTarget::new().with_listing(vec![looping]));

    let outcome = h.orchestrator.delete_all_products().await;

    match outcome {
        RunOutcome::Failed { error, partial } => {
            assert!(matches!(error, SyncError::Contract(_)));
            assert_eq!(partial.total_items, 2);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

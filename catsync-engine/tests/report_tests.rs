use catsync_engine::governor::BatchOutcome;
use catsync_engine::{DispatchError, DispatchReceipt, ReportAggregator};
use catsync_types::{CatalogEntity, JobKind, RunId, VariantRecord};
use std::time::Duration;

fn fulfilled(completed: u64, failed: u64) -> BatchOutcome {
    BatchOutcome::Fulfilled {
        kind: JobKind::ItemCreated,
        size: (completed + failed) as usize,
        receipt: DispatchReceipt::new(completed, failed),
    }
}

// ── Totals ───────────────────────────────────────────────────────

#[test]
fn fresh_report_is_zeroed() {
    let run_id = RunId::new();
    let report = ReportAggregator::new(run_id).finish();
    assert_eq!(report.run_id, run_id);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.errored, 0);
    assert_eq!(report.total_items, 0);
    assert_eq!(report.total_variants, 0);
    assert_eq!(report.total_events, 0);
}

#[test]
fn pages_count_every_variant() {
    let mut aggregator = ReportAggregator::new(RunId::new());
    aggregator.record_page(&[
        CatalogEntity::new("a")
            .with_variant(VariantRecord::new("a-1"))
            .with_variant(VariantRecord::default()),
        CatalogEntity::new("b")
            .with_published(false)
            .with_variant(VariantRecord::new("b-1")),
    ]);
    aggregator.record_page(&[CatalogEntity::new("c")]);
    aggregator.record_listed(4);

    let report = aggregator.snapshot();
    assert_eq!(report.total_items, 7);
    assert_eq!(report.total_variants, 3);
}

#[test]
fn outcomes_fold_into_counters() {
    let mut aggregator = ReportAggregator::new(RunId::new());
    aggregator.fold_outcomes(&[
        fulfilled(5, 1),
        BatchOutcome::RateLimited {
            kind: JobKind::ItemUpdated,
            size: 10,
            retry_after: Some(Duration::from_secs(1)),
        },
        BatchOutcome::Rejected {
            kind: JobKind::VariantDeleted,
            size: 3,
            error: DispatchError::Transport("reset".into()),
        },
        fulfilled(2, 0),
    ]);

    let report = aggregator.finish();
    assert_eq!(report.succeeded, 7);
    assert_eq!(report.errored, 2);
    assert_eq!(report.total_events, 4);
}

// ── Serialization ────────────────────────────────────────────────

#[test]
fn report_serializes_camel_case() {
    let report = ReportAggregator::new(RunId::new()).finish();
    let json = serde_json::to_value(&report).unwrap();
    for field in [
        "runId",
        "startedAt",
        "succeeded",
        "errored",
        "totalItems",
        "totalVariants",
        "totalEvents",
        "elapsedMs",
    ] {
        assert!(json.get(field).is_some(), "missing {field}");
    }
    let back: catsync_engine::SyncReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, report);
    assert_eq!(back.elapsed(), Duration::from_millis(report.elapsed_ms));
}

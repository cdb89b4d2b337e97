use async_trait::async_trait;
use catsync_engine::ports::mock::{MockTarget, ScriptedOutcome};
use catsync_engine::{
    BatchOutcome, DispatchError, DispatchGovernor, DispatchReceipt, Dispatcher, Pacer,
    RateLimitConfig, ReportAggregator,
};
use catsync_types::{BatchJob, JobKind, RunId};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingPacer {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingPacer {
    fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, delay: Duration) {
        self.pauses.lock().unwrap().push(delay);
    }
}

fn batch(kind: JobKind, size: usize) -> BatchJob {
    BatchJob::new(kind, (0..size).map(|i| json!({ "n": i })).collect())
}

fn batches(count: usize) -> Vec<BatchJob> {
    (0..count).map(|_| batch(JobKind::ItemCreated, 2)).collect()
}

fn governor(target: Arc<MockTarget>, pacer: Arc<RecordingPacer>) -> DispatchGovernor {
    DispatchGovernor::new(target, RateLimitConfig::default()).with_pacer(pacer)
}

fn limited(secs: Option<u64>) -> ScriptedOutcome {
    ScriptedOutcome::Fail(DispatchError::RateLimited {
        retry_after: secs.map(Duration::from_secs),
    })
}

// ── Outcome classification ───────────────────────────────────────

#[test]
fn classifies_results() {
    let b = batch(JobKind::VariantCreated, 3);
    assert!(BatchOutcome::from_result(&b, Ok(DispatchReceipt::new(3, 0))).is_fulfilled());
    assert!(BatchOutcome::from_result(
        &b,
        Err(DispatchError::RateLimited { retry_after: None })
    )
    .is_rate_limited());
    assert!(BatchOutcome::from_result(
        &b,
        Err(DispatchError::Rejected {
            status: 429,
            message: String::new()
        })
    )
    .is_rate_limited());
    assert!(BatchOutcome::from_result(
        &b,
        Err(DispatchError::Rejected {
            status: 400,
            message: "bad".into()
        })
    )
    .is_rejected());
    assert!(BatchOutcome::from_result(&b, Err(DispatchError::Transport("reset".into()))).is_rejected());
}

// ── Stages ───────────────────────────────────────────────────────

#[tokio::test]
async fn every_batch_is_sent_and_awaited() {
    let target = Arc::new(MockTarget::new().with_script(vec![ScriptedOutcome::Fail(
        DispatchError::Transport("reset".into()),
    )]));
    let pacer = Arc::new(RecordingPacer::default());

    let stage = governor(target.clone(), pacer.clone())
        .run_stage("items", &batches(5))
        .await;

    assert_eq!(target.sent().len(), 5);
    assert_eq!(stage.outcomes.len(), 5);
    assert_eq!(stage.rejected(), 1);
    assert_eq!(stage.fulfilled(), 4);
    assert!(stage.pause.is_none());
    assert!(pacer.pauses().is_empty());
}

#[tokio::test]
async fn empty_stage_sends_nothing() {
    let target = Arc::new(MockTarget::new());
    let pacer = Arc::new(RecordingPacer::default());
    let stage = governor(target.clone(), pacer.clone()).run_stage("empty", &[]).await;
    assert!(stage.outcomes.is_empty());
    assert!(target.sent().is_empty());
    assert!(pacer.pauses().is_empty());
}

#[tokio::test]
async fn rate_limited_stage_pauses_once_for_largest_hint() {
    let target = Arc::new(MockTarget::new().with_script(vec![
        limited(Some(2)),
        limited(Some(7)),
        limited(None),
    ]));
    let pacer = Arc::new(RecordingPacer::default());

    let stage = governor(target, pacer.clone()).run_stage("items", &batches(4)).await;

    assert_eq!(stage.rate_limited(), 3);
    assert_eq!(stage.pause, Some(Duration::from_secs(7)));
    assert_eq!(pacer.pauses(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn missing_hint_uses_default_delay() {
    let target = Arc::new(MockTarget::new().with_script(vec![limited(None)]));
    let pacer = Arc::new(RecordingPacer::default());
    governor(target, pacer.clone()).run_stage("items", &batches(1)).await;
    assert_eq!(pacer.pauses(), vec![Duration::from_millis(1000)]);
}

#[tokio::test]
async fn pause_is_clamped_to_max() {
    let target = Arc::new(MockTarget::new().with_script(vec![limited(Some(3600))]));
    let pacer = Arc::new(RecordingPacer::default());
    governor(target, pacer.clone()).run_stage("items", &batches(1)).await;
    assert_eq!(pacer.pauses(), vec![Duration::from_secs(60)]);
}

#[tokio::test]
async fn each_stage_pauses_independently() {
    let target = Arc::new(MockTarget::new().with_script(vec![
        limited(Some(1)),
        ScriptedOutcome::Accept(DispatchReceipt::new(2, 0)),
        limited(Some(3)),
    ]));
    let pacer = Arc::new(RecordingPacer::default());
    let governor = governor(target, pacer.clone());

    governor.run_stage("first", &batches(1)).await;
    governor.run_stage("second", &batches(1)).await;
    governor.run_stage("third", &batches(1)).await;

    assert_eq!(
        pacer.pauses(),
        vec![Duration::from_secs(1), Duration::from_secs(3)]
    );
}

// ── Concurrency bound ────────────────────────────────────────────

#[derive(Default)]
struct InFlightProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Dispatcher for InFlightProbe {
    async fn send(&self, batch: &BatchJob) -> Result<DispatchReceipt, DispatchError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(DispatchReceipt::new(batch.len() as u64, 0))
    }
}

#[tokio::test(start_paused = true)]
async fn fan_out_respects_concurrency_bound() {
    let probe = Arc::new(InFlightProbe::default());
    let governor = DispatchGovernor::new(probe.clone(), RateLimitConfig::default())
        .with_concurrency(3)
        .with_pacer(Arc::new(RecordingPacer::default()));

    let outcomes = governor.dispatch(&batches(10)).await;

    assert_eq!(outcomes.len(), 10);
    assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
}

// ── Report folding ───────────────────────────────────────────────

#[tokio::test]
async fn scenario_d_rate_limited_batch_counts_nowhere() {
    let target = Arc::new(MockTarget::new().with_script(vec![
        ScriptedOutcome::Accept(DispatchReceipt::new(8, 2)),
        limited(Some(1)),
        ScriptedOutcome::Accept(DispatchReceipt::new(9, 1)),
    ]));
    let pacer = Arc::new(RecordingPacer::default());
    let stage = governor(target, pacer.clone()).run_stage("items", &batches(3)).await;

    let mut aggregator = ReportAggregator::new(RunId::new());
    aggregator.fold_stage(&stage);
    let report = aggregator.finish();

    assert_eq!(report.succeeded, 17);
    assert_eq!(report.errored, 3);
    assert_eq!(report.total_events, 3);
    assert_eq!(pacer.pauses().len(), 1);
}

#[tokio::test]
async fn rejected_batch_counts_as_one_error() {
    let target = Arc::new(MockTarget::new().with_script(vec![ScriptedOutcome::Fail(
        DispatchError::Rejected {
            status: 400,
            message: "invalid".into(),
        },
    )]));
    let stage = governor(target, Arc::new(RecordingPacer::default()))
        .run_stage("items", &batches(2))
        .await;

    let mut aggregator = ReportAggregator::new(RunId::new());
    aggregator.fold_stage(&stage);
    let report = aggregator.snapshot();
    assert_eq!(report.errored, 1);
    assert_eq!(report.succeeded, 2);
}

//! Batch grouper.
//!
//! Packs the payload entries of every request of one kind, in encounter
//! order, into batches of at most `max_size` entries. Greedy packing in order
//! yields the minimal batch count, `ceil(entries / max_size)`. Kinds are
//! grouped independently and never share a batch.

use catsync_types::{BatchJob, JobKind, JobRequest};
use std::collections::BTreeMap;

/// Groups the requests of a single kind into size-bounded batches.
///
/// Requests of any other kind are ignored. `max_size` of zero is treated as one.
pub fn group_into_batches(requests: &[JobRequest], kind: JobKind, max_size: usize) -> Vec<BatchJob> {
    let entries: Vec<serde_json::Value> = requests
        .iter()
        .filter(|r| r.kind == kind)
        .flat_map(|r| r.payload.iter().cloned())
        .collect();
    pack(kind, entries, max_size)
}

fn pack(kind: JobKind, entries: Vec<serde_json::Value>, max_size: usize) -> Vec<BatchJob> {
    let max_size = max_size.max(1);
    let mut batches = Vec::with_capacity(entries.len().div_ceil(max_size));
    let mut current = Vec::with_capacity(max_size.min(entries.len()));
    for entry in entries {
        current.push(entry);
        if current.len() == max_size {
            batches.push(BatchJob::new(kind, std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        batches.push(BatchJob::new(kind, current));
    }
    batches
}

/// Batches for several kinds, grouped independently.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GroupedBatches {
    by_kind: BTreeMap<JobKind, Vec<BatchJob>>,
}

impl GroupedBatches {
    /// Consumes `requests`, grouping every request whose kind is in `kinds`.
    /// Requests of other kinds are dropped.
    pub fn group(requests: Vec<JobRequest>, kinds: &[JobKind], max_size: usize) -> Self {
        let mut entries: BTreeMap<JobKind, Vec<serde_json::Value>> =
            kinds.iter().map(|k| (*k, Vec::new())).collect();
        for request in requests {
            if let Some(bucket) = entries.get_mut(&request.kind) {
                bucket.extend(request.payload);
            }
        }
        let by_kind = entries
            .into_iter()
            .map(|(kind, entries)| (kind, pack(kind, entries, max_size)))
            .collect();
        Self { by_kind }
    }

    /// Batches of one kind, in order.
    pub fn get(&self, kind: JobKind) -> &[BatchJob] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes and returns the batches of one kind.
    pub fn take(&mut self, kind: JobKind) -> Vec<BatchJob> {
        self.by_kind.remove(&kind).unwrap_or_default()
    }

    /// Total batch count across kinds.
    pub fn batch_count(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }
}

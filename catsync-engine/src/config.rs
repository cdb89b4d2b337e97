//! Engine configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lock key shared by bulk sync and the full wipe.
pub const DEFAULT_LOCK_KEY: &str = "productFullSync";

/// Maximum entries the target accepts in one bulk job.
pub const MAX_BATCH_SIZE: usize = 100;

/// Whether records that already exist in the target receive update jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Emit an update for every entity or variant that is not new, whether or
    /// not any field changed.
    #[default]
    Always,
    /// Never emit updates; only creations and deletions are dispatched.
    SkipExisting,
}

impl UpdatePolicy {
    /// Whether update jobs should be produced.
    pub fn emits_updates(&self) -> bool {
        matches!(self, UpdatePolicy::Always)
    }
}

/// Pause policy applied after a stage that saw throttling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Pause used when the target gave no retry-after hint (ms).
    pub default_delay_ms: u64,
    /// Upper bound on any pause (ms).
    pub max_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    /// Pause used when no hint was given.
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    /// Upper bound on any pause.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Configuration for a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Single-flight lock key.
    pub lock_key: String,
    /// Maximum payload entries per batch job.
    pub max_batch_size: usize,
    /// Batches in flight at once within a stage.
    pub dispatch_concurrency: usize,
    /// Variant existence lookups in flight at once within a page.
    pub lookup_concurrency: usize,
    /// Update emission policy.
    pub update_policy: UpdatePolicy,
    /// Rate-limit pause policy.
    pub rate_limit: RateLimitConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            max_batch_size: MAX_BATCH_SIZE,
            dispatch_concurrency: 10,
            lookup_concurrency: 10,
            update_policy: UpdatePolicy::Always,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.lock_key.trim().is_empty() {
            return Err(SyncError::Config("lock_key must not be empty".into()));
        }
        if self.max_batch_size == 0 {
            return Err(SyncError::Config("max_batch_size must be > 0".into()));
        }
        if self.dispatch_concurrency == 0 {
            return Err(SyncError::Config("dispatch_concurrency must be > 0".into()));
        }
        if self.lookup_concurrency == 0 {
            return Err(SyncError::Config("lookup_concurrency must be > 0".into()));
        }
        if self.rate_limit.max_delay_ms < self.rate_limit.default_delay_ms {
            return Err(SyncError::Config(
                "rate_limit.max_delay_ms must be >= rate_limit.default_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

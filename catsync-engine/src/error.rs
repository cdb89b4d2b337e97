//! Error types for the reconciliation engine.

use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a run.
///
/// Anything surfacing as a `SyncError` from a collaborator outside the
/// dispatch protocol is fatal for the current run: the orchestrator releases
/// the lock and reports the partial totals.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source catalog could not be read.
    #[error("source error: {0}")]
    Source(String),

    /// A target lookup or listing failed.
    #[error("target error: {0}")]
    Target(String),

    /// The lock store failed for a reason other than contention.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A collaborator returned something that breaks its contract.
    #[error("contract violation: {0}")]
    Contract(String),
}

/// Lock store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Another holder owns the lock.
    #[error("lock already held: {0}")]
    Held(String),

    /// The backing store failed.
    #[error("lock store failure: {0}")]
    Store(String),
}

impl LockError {
    /// Returns true if this is contention rather than a store failure.
    pub fn is_held(&self) -> bool {
        matches!(self, LockError::Held(_))
    }
}

/// Why the target refused a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The target is throttling us.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The target rejected the request.
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The request never got a response.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl DispatchError {
    /// Returns true if this error represents a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            DispatchError::RateLimited { .. } => true,
            DispatchError::Rejected { status, .. } => *status == 429,
            DispatchError::Transport(_) => false,
        }
    }

    /// Returns the retry-after hint if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DispatchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

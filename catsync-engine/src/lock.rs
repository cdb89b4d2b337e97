//! Single-flight lock.
//!
//! Bulk sync and the full wipe share one lock key so that at most one of them
//! runs at a time across every replica that shares the same [`LockStore`].
//! Durability of the lock is the store's concern; the guard only speaks the
//! acquire/release contract.

use crate::error::LockError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Backing store for named locks.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Takes the lock, failing with [`LockError::Held`] if another holder is active.
    async fn acquire(&self, key: &str) -> Result<(), LockError>;

    /// Releases the lock. Must succeed when the lock is not held.
    async fn release(&self, key: &str) -> Result<(), LockError>;
}

/// Process-local lock store, suitable for a single replica and for tests.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    held: Mutex<HashSet<String>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the key is currently held.
    pub async fn is_held(&self, key: &str) -> bool {
        self.held.lock().await.contains(key)
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn acquire(&self, key: &str) -> Result<(), LockError> {
        let mut held = self.held.lock().await;
        if !held.insert(key.to_string()) {
            return Err(LockError::Held(key.to_string()));
        }
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), LockError> {
        self.held.lock().await.remove(key);
        Ok(())
    }
}

/// Proof of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// The lock key.
    pub key: String,
    /// When the lock was taken.
    pub acquired_at: DateTime<Utc>,
}

/// Guards one named lock on a shared store.
#[derive(Clone)]
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    key: String,
}

impl LockGuard {
    /// Creates a guard for `key` on `store`.
    pub fn new(store: Arc<dyn LockStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Returns the lock key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Acquires exclusive ownership.
    pub async fn acquire(&self) -> Result<LockToken, LockError> {
        self.store.acquire(&self.key).await?;
        debug!("Acquired lock {}", self.key);
        Ok(LockToken {
            key: self.key.clone(),
            acquired_at: Utc::now(),
        })
    }

    /// Releases the lock. Safe to call whether or not it is held.
    pub async fn release(&self) -> Result<(), LockError> {
        self.store.release(&self.key).await?;
        debug!("Released lock {}", self.key);
        Ok(())
    }
}

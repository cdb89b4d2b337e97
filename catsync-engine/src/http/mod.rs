//! HTTP collaborators.
//!
//! [`HttpSourceFetcher`] reads the source catalog over a cursor-paginated
//! JSON endpoint. [`HttpTargetClient`] serves every target role against a
//! JSON:API catalog: existence lookups, bulk job dispatch, item deletion and
//! listing.

mod source;
mod target;

pub use source::{HttpSourceConfig, HttpSourceFetcher};
pub use target::{HttpTargetClient, HttpTargetConfig};

use crate::error::{SyncError, SyncResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;

fn build_client(timeout_secs: u64) -> SyncResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))
}

/// Parses a `Retry-After` header given in whole seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

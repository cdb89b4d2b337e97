//! Source catalog reader.

use super::{build_client, trim_base};
use crate::error::{SyncError, SyncResult};
use crate::ports::{SourceFetcher, SourcePage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Source endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSourceConfig {
    /// Base URL; pages are read from `{base_url}/entities`.
    pub base_url: String,
    /// Bearer token, if the source requires one.
    pub api_key: Option<String>,
    /// Entities requested per page.
    pub page_size: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            api_key: None,
            page_size: 100,
            timeout_secs: 60,
        }
    }
}

/// Reads `{entities, lastId, hasMore}` pages from the source.
pub struct HttpSourceFetcher {
    config: HttpSourceConfig,
    client: Client,
}

impl HttpSourceFetcher {
    pub fn new(config: HttpSourceConfig) -> SyncResult<Self> {
        let client = build_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpSourceConfig {
        &self.config
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn get_page(&self, cursor: Option<&str>) -> SyncResult<SourcePage> {
        let mut request = self
            .client
            .get(format!("{}/entities", trim_base(&self.config.base_url)))
            .query(&[("limit", self.config.page_size.to_string())]);
        if let Some(after) = cursor {
            request = request.query(&[("after", after)]);
        }
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Source(format!("page request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Source(format!(
                "page request returned {status}: {error}"
            )));
        }

        let page: SourcePage = response
            .json()
            .await
            .map_err(|e| SyncError::Source(format!("failed to parse page: {e}")))?;
        debug!(
            "Fetched {} source entities (has_more: {})",
            page.entities.len(),
            page.has_more
        );
        Ok(page)
    }
}

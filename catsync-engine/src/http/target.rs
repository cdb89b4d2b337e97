//! JSON:API catalog target.

use super::{build_client, retry_after, trim_base};
use crate::error::{DispatchError, SyncError, SyncResult};
use crate::ports::{
    CatalogLister, DispatchReceipt, Dispatcher, ItemExistence, TargetPage, TargetRecord,
    VariantExistence,
};
use async_trait::async_trait;
use catsync_types::{BatchJob, JobKind};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Target endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTargetConfig {
    /// Base URL; the API lives under `{base_url}/api`.
    pub base_url: String,
    /// API key sent in the `Authorization` header.
    pub api_key: String,
    /// Scheme placed before the key (e.g. `Bearer`).
    pub auth_scheme: String,
    /// Optional API revision sent as the `revision` header.
    pub revision: Option<String>,
    /// Item keys per existence lookup request.
    pub lookup_chunk_size: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpTargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8091".to_string(),
            api_key: String::new(),
            auth_scheme: "Bearer".to_string(),
            revision: None,
            lookup_chunk_size: 100,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<Resource>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    data: JobData,
}

#[derive(Debug, Deserialize)]
struct JobData {
    #[serde(default)]
    attributes: JobAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct JobAttributes {
    #[serde(default)]
    completed_count: u64,
    #[serde(default)]
    failed_count: u64,
}

/// Bulk job resource for a kind: (endpoint, resource type, payload member).
fn job_resource(kind: JobKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        JobKind::ItemCreated => (
            "catalog-item-bulk-create-jobs",
            "catalog-item-bulk-create-job",
            "items",
        ),
        JobKind::ItemUpdated => (
            "catalog-item-bulk-update-jobs",
            "catalog-item-bulk-update-job",
            "items",
        ),
        JobKind::ItemDeleted => (
            "catalog-item-bulk-delete-jobs",
            "catalog-item-bulk-delete-job",
            "items",
        ),
        JobKind::VariantCreated => (
            "catalog-variant-bulk-create-jobs",
            "catalog-variant-bulk-create-job",
            "variants",
        ),
        JobKind::VariantUpdated => (
            "catalog-variant-bulk-update-jobs",
            "catalog-variant-bulk-update-job",
            "variants",
        ),
        JobKind::VariantDeleted => (
            "catalog-variant-bulk-delete-jobs",
            "catalog-variant-bulk-delete-job",
            "variants",
        ),
    }
}

/// Client for a JSON:API catalog target. Serves every target role.
pub struct HttpTargetClient {
    config: HttpTargetConfig,
    client: Client,
}

impl HttpTargetClient {
    pub fn new(config: HttpTargetConfig) -> SyncResult<Self> {
        let client = build_client(config.timeout_secs)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpTargetConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", trim_base(&self.config.base_url), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(
                "Authorization",
                format!("{} {}", self.config.auth_scheme, self.config.api_key),
            )
            .header("Accept", "application/json");
        match &self.config.revision {
            Some(revision) => request.header("revision", revision),
            None => request,
        }
    }

    /// Fetches one list page; `None` when the target answers 404.
    async fn fetch_list(&self, url: &str) -> SyncResult<Option<ListResponse>> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| SyncError::Target(format!("lookup failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(SyncError::Target(format!("lookup returned {status}: {error}")));
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| SyncError::Target(format!("failed to parse lookup response: {e}")))
    }

    async fn get_list(&self, url: &str) -> SyncResult<ListResponse> {
        self.fetch_list(url)
            .await?
            .ok_or_else(|| SyncError::Target(format!("lookup returned 404 Not Found: {url}")))
    }

    /// Collects `first` and every page reachable through `links.next`.
    async fn follow(&self, first: ListResponse, url: String) -> SyncResult<Vec<TargetRecord>> {
        let mut records = Vec::new();
        let mut page = first;
        let mut current = url;
        loop {
            records.extend(page.data.into_iter().map(|r| TargetRecord::new(r.id)));
            let Some(link) = page.links.next else {
                break;
            };
            let next = resolve_link(&current, &link)?.to_string();
            if next == current {
                break;
            }
            page = self.get_list(&next).await?;
            current = next;
        }
        Ok(records)
    }

    /// Follows `links.next` from `url` until the last page.
    async fn get_all(&self, url: String) -> SyncResult<Vec<TargetRecord>> {
        let first = self.get_list(&url).await?;
        self.follow(first, url).await
    }

    async fn delete_item(&self, id: &str) -> Result<DispatchReceipt, DispatchError> {
        let url = self.api_url(&format!("catalog-items/{}/", urlencoding::encode(id)));
        let response = self
            .authorized(self.client.delete(url))
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        check_dispatch(response).await?;
        Ok(DispatchReceipt::new(1, 0))
    }

    async fn create_job(&self, batch: &BatchJob) -> Result<DispatchReceipt, DispatchError> {
        let (endpoint, resource, member) = job_resource(batch.kind);
        let body = json!({
            "data": {
                "type": resource,
                "attributes": { member: { "data": batch.payload } }
            }
        });
        let response = self
            .authorized(self.client.post(self.api_url(&format!("{endpoint}/"))))
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let response = check_dispatch(response).await?;

        let job: JobResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Transport(format!("failed to parse job response: {e}")))?;
        Ok(DispatchReceipt::new(
            job.data.attributes.completed_count,
            job.data.attributes.failed_count,
        ))
    }
}

/// Maps a non-success dispatch response to its error.
async fn check_dispatch(response: Response) -> Result<Response, DispatchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after(response.headers());
        warn!("Target rate limited dispatch (retry after {:?})", retry_after);
        return Err(DispatchError::RateLimited { retry_after });
    }
    let message = response.text().await.unwrap_or_default();
    Err(DispatchError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Resolves a possibly relative link against the URL it was served from.
fn resolve_link(base: &str, link: &str) -> SyncResult<Url> {
    Url::parse(base)
        .and_then(|base| base.join(link))
        .map_err(|e| SyncError::Contract(format!("invalid next link {link}: {e}")))
}

/// Extracts `page[cursor]` from a next link.
fn cursor_from_link(base: &str, link: &str) -> SyncResult<String> {
    resolve_link(base, link)?
        .query_pairs()
        .find(|(k, _)| k == "page[cursor]")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| SyncError::Contract(format!("next link without page[cursor]: {link}")))
}

#[async_trait]
impl ItemExistence for HttpTargetClient {
    async fn existing_items(&self, keys: &[String]) -> SyncResult<Vec<TargetRecord>> {
        let mut found = Vec::new();
        for chunk in keys.chunks(self.config.lookup_chunk_size.max(1)) {
            let ids = chunk
                .iter()
                .map(|k| format!("\"{k}\""))
                .collect::<Vec<_>>()
                .join(",");
            let filter = format!("any(ids,[{ids}])");
            let url = format!(
                "{}?filter={}",
                self.api_url("catalog-items/"),
                urlencoding::encode(&filter)
            );
            found.extend(self.get_all(url).await?);
        }
        debug!("{} of {} item keys exist in target", found.len(), keys.len());
        Ok(found)
    }
}

#[async_trait]
impl VariantExistence for HttpTargetClient {
    async fn existing_variants(
        &self,
        item_key: &str,
        cursor: Option<&str>,
        fields: &[&str],
    ) -> SyncResult<Vec<TargetRecord>> {
        let mut url = format!(
            "{}?{}={}",
            self.api_url(&format!("catalog-items/{}/variants/", urlencoding::encode(item_key))),
            urlencoding::encode("fields[catalog-variant]"),
            urlencoding::encode(&fields.join(","))
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode("page[cursor]"),
                urlencoding::encode(cursor)
            ));
        }
        // Unknown parent item: nothing synced under it yet.
        let Some(first) = self.fetch_list(&url).await? else {
            debug!("No target item {}, treating its variants as empty", item_key);
            return Ok(Vec::new());
        };
        self.follow(first, url).await
    }
}

#[async_trait]
impl Dispatcher for HttpTargetClient {
    async fn send(&self, batch: &BatchJob) -> Result<DispatchReceipt, DispatchError> {
        if batch.kind == JobKind::ItemDeleted && batch.len() == 1 {
            if let Some(id) = batch.payload.first().and_then(|e| e.get("id")).and_then(Value::as_str) {
                return self.delete_item(id).await;
            }
        }
        self.create_job(batch).await
    }
}

#[async_trait]
impl CatalogLister for HttpTargetClient {
    async fn list_items(&self, cursor: Option<&str>) -> SyncResult<TargetPage> {
        let mut url = format!(
            "{}?{}=id",
            self.api_url("catalog-items/"),
            urlencoding::encode("fields[catalog-item]")
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode("page[cursor]"),
                urlencoding::encode(cursor)
            ));
        }
        let page = self.get_list(&url).await?;
        let next_cursor = match page.links.next.as_deref() {
            Some(link) => Some(cursor_from_link(&url, link)?),
            None => None,
        };
        Ok(TargetPage {
            items: page
                .data
                .into_iter()
                .map(|r| TargetRecord::new(r.id))
                .collect(),
            next_cursor,
        })
    }
}

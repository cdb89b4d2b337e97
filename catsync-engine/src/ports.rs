//! Collaborator interfaces consumed by the engine.
//!
//! The engine never talks to a platform directly. Source reads, target
//! lookups, dispatch and listing all go through these traits so that the
//! HTTP adapters in [`crate::http`] and the in-memory fakes in [`mock`] are
//! interchangeable.

use crate::error::{DispatchError, SyncResult};
use async_trait::async_trait;
use catsync_types::{BatchJob, CatalogEntity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One page of the source catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePage {
    /// Entities on this page.
    pub entities: Vec<CatalogEntity>,
    /// Cursor to pass for the next page.
    #[serde(default)]
    pub last_id: Option<String>,
    /// Whether another page follows.
    #[serde(default)]
    pub has_more: bool,
}

/// A record that exists in the target, identified by its existence key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRecord {
    pub id: String,
}

impl TargetRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One page of the target catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetPage {
    /// Items on this page.
    pub items: Vec<TargetRecord>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Per-entity counts the target reports for an accepted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub completed: u64,
    pub failed: u64,
}

impl DispatchReceipt {
    pub fn new(completed: u64, failed: u64) -> Self {
        Self { completed, failed }
    }
}

/// Cursor-paginated reader of the source catalog.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetches the page after `cursor` (`None` for the first page).
    async fn get_page(&self, cursor: Option<&str>) -> SyncResult<SourcePage>;
}

/// Batched item membership lookup against the target.
#[async_trait]
pub trait ItemExistence: Send + Sync {
    /// Returns the subset of `keys` that exist in the target.
    async fn existing_items(&self, keys: &[String]) -> SyncResult<Vec<TargetRecord>>;
}

/// Variant membership lookup scoped to one parent item.
#[async_trait]
pub trait VariantExistence: Send + Sync {
    /// Returns the variants the target holds under `item_key`.
    async fn existing_variants(
        &self,
        item_key: &str,
        cursor: Option<&str>,
        fields: &[&str],
    ) -> SyncResult<Vec<TargetRecord>>;
}

/// Sends batch jobs to the target.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Sends one batch. Rate limiting must be reported as
    /// [`DispatchError::RateLimited`] so the governor can pace.
    async fn send(&self, batch: &BatchJob) -> Result<DispatchReceipt, DispatchError>;
}

/// Cursor-paginated listing of the target's items, used by the full wipe.
#[async_trait]
pub trait CatalogLister: Send + Sync {
    async fn list_items(&self, cursor: Option<&str>) -> SyncResult<TargetPage>;
}

/// The four target-side roles, usually served by one client.
#[derive(Clone)]
pub struct TargetPorts {
    pub items: Arc<dyn ItemExistence>,
    pub variants: Arc<dyn VariantExistence>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub lister: Arc<dyn CatalogLister>,
}

impl TargetPorts {
    /// Uses one client for every role.
    pub fn from_shared<T>(target: Arc<T>) -> Self
    where
        T: ItemExistence + VariantExistence + Dispatcher + CatalogLister + 'static,
    {
        Self {
            items: target.clone(),
            variants: target.clone(),
            dispatcher: target.clone(),
            lister: target,
        }
    }
}

/// In-memory collaborators for tests and local runs.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    /// Serves a fixed sequence of source pages.
    #[derive(Debug, Default)]
    pub struct MockSource {
        pages: Vec<SourcePage>,
        fail_at: Option<usize>,
        requested: Mutex<Vec<Option<String>>>,
    }

    impl MockSource {
        /// Splits `entities` into pages of `page_size`, chaining cursors.
        pub fn paged(entities: Vec<CatalogEntity>, page_size: usize) -> Self {
            let chunks: Vec<Vec<CatalogEntity>> = entities
                .chunks(page_size.max(1))
                .map(<[CatalogEntity]>::to_vec)
                .collect();
            let count = chunks.len();
            let pages = chunks
                .into_iter()
                .enumerate()
                .map(|(i, entities)| SourcePage {
                    last_id: entities.last().map(|e| e.id.to_string()),
                    entities,
                    has_more: i + 1 < count,
                })
                .collect();
            Self::from_pages(pages)
        }

        /// Serves exactly these pages.
        pub fn from_pages(pages: Vec<SourcePage>) -> Self {
            Self {
                pages,
                ..Default::default()
            }
        }

        /// Makes the `index`-th request fail.
        pub fn failing_at(mut self, index: usize) -> Self {
            self.fail_at = Some(index);
            self
        }

        /// Cursors passed to each `get_page` call, in order.
        pub fn requested_cursors(&self) -> Vec<Option<String>> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceFetcher for MockSource {
        async fn get_page(&self, cursor: Option<&str>) -> SyncResult<SourcePage> {
            let index = {
                let mut requested = self.requested.lock().unwrap();
                requested.push(cursor.map(str::to_string));
                requested.len() - 1
            };
            if self.fail_at == Some(index) {
                return Err(SyncError::Source(format!("page {index} unavailable")));
            }
            Ok(self.pages.get(index).cloned().unwrap_or_default())
        }
    }

    /// Outcome a [`MockTarget`] should produce for a dispatched batch.
    #[derive(Debug, Clone)]
    pub enum ScriptedOutcome {
        Accept(DispatchReceipt),
        Fail(DispatchError),
    }

    /// A fake target holding item and variant key sets, recording every batch.
    #[derive(Debug, Default)]
    pub struct MockTarget {
        items: Mutex<HashSet<String>>,
        variants: Mutex<HashMap<String, Vec<String>>>,
        listing: Mutex<Vec<TargetPage>>,
        script: Mutex<VecDeque<ScriptedOutcome>>,
        sent: Mutex<Vec<BatchJob>>,
        variant_lookups: Mutex<Vec<String>>,
        fail_lookups: Mutex<bool>,
    }

    impl MockTarget {
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks item keys as already synced.
        pub fn with_items<I, S>(self, keys: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.items
                .lock()
                .unwrap()
                .extend(keys.into_iter().map(Into::into));
            self
        }

        /// Marks variant keys as already synced under `item_key`.
        pub fn with_variants<I, S>(self, item_key: impl Into<String>, keys: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.variants
                .lock()
                .unwrap()
                .insert(item_key.into(), keys.into_iter().map(Into::into).collect());
            self
        }

        /// Pages served by [`CatalogLister::list_items`], in order.
        pub fn with_listing(self, pages: Vec<TargetPage>) -> Self {
            *self.listing.lock().unwrap() = pages;
            self
        }

        /// Queues outcomes for the next dispatched batches. Once the script
        /// runs out every batch is accepted in full.
        pub fn with_script(self, outcomes: Vec<ScriptedOutcome>) -> Self {
            self.script.lock().unwrap().extend(outcomes);
            self
        }

        /// Makes every existence lookup fail.
        pub fn with_failing_lookups(self) -> Self {
            *self.fail_lookups.lock().unwrap() = true;
            self
        }

        /// Every batch received so far.
        pub fn sent(&self) -> Vec<BatchJob> {
            self.sent.lock().unwrap().clone()
        }

        /// Batches received of one kind.
        pub fn sent_of(&self, kind: catsync_types::JobKind) -> Vec<BatchJob> {
            self.sent().into_iter().filter(|b| b.kind == kind).collect()
        }

        /// Item keys passed to variant lookups.
        pub fn variant_lookups(&self) -> Vec<String> {
            self.variant_lookups.lock().unwrap().clone()
        }

        fn check_lookups(&self) -> SyncResult<()> {
            if *self.fail_lookups.lock().unwrap() {
                return Err(SyncError::Target("lookup unavailable".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ItemExistence for MockTarget {
        async fn existing_items(&self, keys: &[String]) -> SyncResult<Vec<TargetRecord>> {
            self.check_lookups()?;
            let items = self.items.lock().unwrap();
            Ok(keys
                .iter()
                .filter(|k| items.contains(*k))
                .map(|k| TargetRecord::new(k.clone()))
                .collect())
        }
    }

    #[async_trait]
    impl VariantExistence for MockTarget {
        async fn existing_variants(
            &self,
            item_key: &str,
            _cursor: Option<&str>,
            _fields: &[&str],
        ) -> SyncResult<Vec<TargetRecord>> {
            self.check_lookups()?;
            self.variant_lookups
                .lock()
                .unwrap()
                .push(item_key.to_string());
            Ok(self
                .variants
                .lock()
                .unwrap()
                .get(item_key)
                .map(|keys| keys.iter().cloned().map(TargetRecord::new).collect())
                .unwrap_or_default())
        }
    }

    #[async_trait]
    impl Dispatcher for MockTarget {
        async fn send(&self, batch: &BatchJob) -> Result<DispatchReceipt, DispatchError> {
            self.sent.lock().unwrap().push(batch.clone());
            let scripted = self.script.lock().unwrap().pop_front();
            match scripted {
                Some(ScriptedOutcome::Accept(receipt)) => Ok(receipt),
                Some(ScriptedOutcome::Fail(err)) => Err(err),
                None => Ok(DispatchReceipt::new(batch.len() as u64, 0)),
            }
        }
    }

    #[async_trait]
    impl CatalogLister for MockTarget {
        async fn list_items(&self, cursor: Option<&str>) -> SyncResult<TargetPage> {
            let index = match cursor {
                None => 0,
                Some(c) => c
                    .parse::<usize>()
                    .map_err(|_| SyncError::Contract(format!("unknown cursor {c}")))?,
            };
            Ok(self
                .listing
                .lock()
                .unwrap()
                .get(index)
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Builds `pages` listing pages of `per_page` items each, chained by
    /// numeric cursors as understood by [`MockTarget`].
    pub fn listing_pages(pages: usize, per_page: usize) -> Vec<TargetPage> {
        (0..pages)
            .map(|p| TargetPage {
                items: (0..per_page)
                    .map(|i| TargetRecord::new(format!("item-{p}-{i}")))
                    .collect(),
                next_cursor: (p + 1 < pages).then(|| (p + 1).to_string()),
            })
            .collect()
    }
}

//! Catalog diff engine: classifies one source page against the target.
//!
//! The engine is streaming: it sees one page of entities plus the existence
//! lookups for that page and turns them into mapped [`JobRequest`]s. Raw
//! entities are not retained past the call.
//!
//! Classification rules:
//! - Only published entities take part.
//! - Item level: an entity keeps only its sync-eligible variants; if none are
//!   left it is neither created nor updated. Otherwise it is created when its
//!   item key is unknown to the target and updated when it is known.
//! - Variant level: eligible source keys are compared with the keys the
//!   target holds under the entity's item. Source-only keys are created,
//!   shared keys are updated, target-only keys are deleted.

use crate::config::UpdatePolicy;
use crate::error::SyncResult;
use crate::keys::KeyFormatter;
use crate::mapper::CatalogMapper;
use crate::ports::{ItemExistence, TargetRecord, VariantExistence};
use catsync_types::{CatalogEntity, JobKind, JobRequest, VariantRecord};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Fields requested from the target when listing an item's variants.
const VARIANT_LOOKUP_FIELDS: &[&str] = &["id"];

/// Entities split by item-level classification, restricted to eligible variants.
#[derive(Debug, Default)]
pub struct ItemBuckets {
    pub created: Vec<CatalogEntity>,
    pub updated: Vec<CatalogEntity>,
}

/// One entity's variants split by classification.
#[derive(Debug, Default)]
pub struct VariantBuckets<'a> {
    pub created: Vec<&'a VariantRecord>,
    pub updated: Vec<&'a VariantRecord>,
    /// Target-side ids of variants no longer eligible in the source.
    pub deleted: Vec<String>,
}

/// Classifies published entities against the set of item keys the target holds.
pub fn bucket_items(
    entities: &[CatalogEntity],
    existing: &HashSet<String>,
    keys: &dyn KeyFormatter,
) -> ItemBuckets {
    let mut buckets = ItemBuckets::default();
    for entity in entities {
        let Some(eligible) = entity.to_eligible() else {
            continue;
        };
        if existing.contains(&keys.item_key(&entity.id)) {
            buckets.updated.push(eligible);
        } else {
            buckets.created.push(eligible);
        }
    }
    buckets
}

/// Classifies one entity's variants against the variants the target holds for it.
///
/// The entity is taken as published; callers filter unpublished entities
/// first. Eligible variants without a SKU have no key and are skipped.
/// Duplicate keys on either side are collapsed to their first occurrence, so
/// the three buckets are pairwise disjoint.
pub fn bucket_variants<'a>(
    entity: &'a CatalogEntity,
    existing: &[TargetRecord],
    keys: &dyn KeyFormatter,
) -> VariantBuckets<'a> {
    let existing_keys: HashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    let mut source_keys = HashSet::new();
    let mut buckets = VariantBuckets::default();

    for variant in entity.eligible_variants() {
        let Some(sku) = variant.key_sku() else {
            continue;
        };
        let key = keys.variant_key(sku);
        if !source_keys.insert(key.clone()) {
            continue;
        }
        if existing_keys.contains(key.as_str()) {
            buckets.updated.push(variant);
        } else {
            buckets.created.push(variant);
        }
    }

    let mut seen = HashSet::new();
    for record in existing {
        if !record.id.is_empty() && !source_keys.contains(&record.id) && seen.insert(&record.id) {
            buckets.deleted.push(record.id.clone());
        }
    }
    buckets
}

/// Classified output for one page.
#[derive(Debug, Default)]
pub struct PageDiff {
    /// `ItemCreated` / `ItemUpdated` requests.
    pub items: Vec<JobRequest>,
    /// `VariantDeleted` / `VariantCreated` / `VariantUpdated` requests.
    pub variants: Vec<JobRequest>,
}

/// Page classifier bound to the target's existence lookups.
#[derive(Clone)]
pub struct DiffEngine {
    items: Arc<dyn ItemExistence>,
    variants: Arc<dyn VariantExistence>,
    keys: Arc<dyn KeyFormatter>,
    mapper: Arc<dyn CatalogMapper>,
    update_policy: UpdatePolicy,
    lookup_concurrency: usize,
}

impl DiffEngine {
    /// Creates a diff engine.
    pub fn new(
        items: Arc<dyn ItemExistence>,
        variants: Arc<dyn VariantExistence>,
        keys: Arc<dyn KeyFormatter>,
        mapper: Arc<dyn CatalogMapper>,
    ) -> Self {
        Self {
            items,
            variants,
            keys,
            mapper,
            update_policy: UpdatePolicy::Always,
            lookup_concurrency: 10,
        }
    }

    /// Sets the update emission policy.
    pub fn with_update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.update_policy = policy;
        self
    }

    /// Sets how many variant lookups may be in flight at once.
    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.lookup_concurrency = concurrency.max(1);
        self
    }

    /// Returns the key formatter.
    pub fn keys(&self) -> &Arc<dyn KeyFormatter> {
        &self.keys
    }

    /// Returns the mapper.
    pub fn mapper(&self) -> &Arc<dyn CatalogMapper> {
        &self.mapper
    }

    /// Classifies a page at item and variant level.
    pub async fn classify_page(&self, entities: &[CatalogEntity]) -> SyncResult<PageDiff> {
        let items = self.classify_items(entities).await?;
        let variants = self.classify_variants(entities).await?;
        Ok(PageDiff { items, variants })
    }

    /// Item-level classification for a page.
    pub async fn classify_items(&self, entities: &[CatalogEntity]) -> SyncResult<Vec<JobRequest>> {
        let published: Vec<&CatalogEntity> = entities.iter().filter(|e| e.published).collect();
        if published.is_empty() {
            return Ok(Vec::new());
        }

        let lookup: Vec<String> = published.iter().map(|e| self.keys.item_key(&e.id)).collect();
        let existing: HashSet<String> = self
            .items
            .existing_items(&lookup)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let buckets = bucket_items(entities, &existing, self.keys.as_ref());
        debug!(
            "Page items: {} to create, {} to update",
            buckets.created.len(),
            buckets.updated.len()
        );

        let mut requests = Vec::new();
        if !buckets.created.is_empty() {
            requests.push(self.item_request(JobKind::ItemCreated, &buckets.created));
        }
        if !buckets.updated.is_empty() && self.update_policy.emits_updates() {
            requests.push(self.item_request(JobKind::ItemUpdated, &buckets.updated));
        }
        Ok(requests)
    }

    /// Variant-level classification for every published entity of a page.
    ///
    /// Lookups run as a bounded concurrent group; output keeps page order.
    pub async fn classify_variants(
        &self,
        entities: &[CatalogEntity],
    ) -> SyncResult<Vec<JobRequest>> {
        let lookups: Vec<_> = entities
            .iter()
            .filter(|e: &&CatalogEntity| e.published)
            .map(|entity: &CatalogEntity| self.classify_entity_variants(entity))
            .collect();
        let per_entity: Vec<Vec<JobRequest>> = stream::iter(lookups)
            .buffered(self.lookup_concurrency)
            .try_collect()
            .await?;
        Ok(per_entity.into_iter().flatten().collect())
    }

    /// Variant-level classification for a single entity. Emits up to three
    /// requests, deletions first.
    pub async fn classify_entity_variants(
        &self,
        entity: &CatalogEntity,
    ) -> SyncResult<Vec<JobRequest>> {
        let item_key = self.keys.item_key(&entity.id);
        let existing = self
            .variants
            .existing_variants(&item_key, None, VARIANT_LOOKUP_FIELDS)
            .await?;
        let buckets = bucket_variants(entity, &existing, self.keys.as_ref());

        let mut requests = Vec::new();
        if !buckets.deleted.is_empty() {
            let payload = buckets
                .deleted
                .iter()
                .map(|id| self.mapper.map_variant_deletion(&entity.id, id))
                .collect();
            requests.push(JobRequest::variant(
                JobKind::VariantDeleted,
                entity.id.clone(),
                payload,
            ));
        }
        if !buckets.created.is_empty() {
            requests.push(self.variant_request(entity, JobKind::VariantCreated, &buckets.created));
        }
        if !buckets.updated.is_empty() && self.update_policy.emits_updates() {
            requests.push(self.variant_request(entity, JobKind::VariantUpdated, &buckets.updated));
        }
        Ok(requests)
    }

    fn item_request(&self, kind: JobKind, entities: &[CatalogEntity]) -> JobRequest {
        JobRequest::item(
            kind,
            entities.iter().map(|e| self.mapper.map_item(e, kind)).collect(),
        )
    }

    fn variant_request(
        &self,
        entity: &CatalogEntity,
        kind: JobKind,
        variants: &[&VariantRecord],
    ) -> JobRequest {
        JobRequest::variant(
            kind,
            entity.id.clone(),
            variants
                .iter()
                .map(|v| self.mapper.map_variant(entity, v, kind))
                .collect(),
        )
    }
}

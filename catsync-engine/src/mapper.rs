//! Mapping from source snapshots to target wire entries.
//!
//! Mappers are pure: they see one entity or variant plus the operation kind
//! and return the JSON entry that goes into a batch payload. No I/O.

use crate::keys::KeyFormatter;
use catsync_types::{Attributes, CatalogEntity, EntityId, JobKind, VariantRecord};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Transforms source records into target payload entries.
pub trait CatalogMapper: Send + Sync {
    /// Maps an entity for `ItemCreated` / `ItemUpdated`.
    fn map_item(&self, entity: &CatalogEntity, kind: JobKind) -> Value;

    /// Maps a variant for `VariantCreated` / `VariantUpdated`.
    fn map_variant(&self, parent: &CatalogEntity, variant: &VariantRecord, kind: JobKind)
        -> Value;

    /// Maps an existing target variant id for `VariantDeleted`.
    fn map_variant_deletion(&self, parent: &EntityId, target_id: &str) -> Value;

    /// Maps an existing target item id for `ItemDeleted`.
    fn map_item_deletion(&self, target_id: &str) -> Value;
}

const ITEM_TYPE: &str = "catalog-item";
const VARIANT_TYPE: &str = "catalog-variant";

/// JSON:API-style entries for a catalog-items/catalog-variants target.
#[derive(Clone)]
pub struct JsonApiMapper {
    keys: Arc<dyn KeyFormatter>,
    catalog_type: String,
    integration_type: String,
}

impl JsonApiMapper {
    /// Creates a mapper keyed by `keys`, for the default custom catalog.
    pub fn new(keys: Arc<dyn KeyFormatter>) -> Self {
        Self {
            keys,
            catalog_type: "$default".to_string(),
            integration_type: "$custom".to_string(),
        }
    }

    fn common_attributes(&self, attrs: &Attributes, variant: Option<&VariantRecord>) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("title".into(), json!(text(attrs, &["title", "name"]).unwrap_or_default()));
        out.insert(
            "description".into(),
            json!(text(attrs, &["description"]).unwrap_or_default()),
        );
        out.insert("url".into(), json!(text(attrs, &["url", "slug"]).unwrap_or_default()));
        if let Some(image) = variant.and_then(|v| v.images.first()) {
            out.insert("image_full_url".into(), json!(image));
        }
        if let Some(price) = variant.and_then(|v| v.prices.first()) {
            out.insert("price".into(), json!(price.major_amount()));
        }
        out.insert("published".into(), json!(true));
        out
    }
}

impl CatalogMapper for JsonApiMapper {
    fn map_item(&self, entity: &CatalogEntity, kind: JobKind) -> Value {
        let mut attributes = self.common_attributes(&entity.attributes, entity.eligible_variants().next());
        match kind {
            JobKind::ItemCreated => {
                attributes.insert("external_id".into(), json!(entity.id.as_str()));
                attributes.insert("catalog_type".into(), json!(self.catalog_type));
                attributes.insert("integration_type".into(), json!(self.integration_type));
                json!({ "type": ITEM_TYPE, "attributes": attributes })
            }
            _ => json!({
                "type": ITEM_TYPE,
                "id": self.keys.item_key(&entity.id),
                "attributes": attributes,
            }),
        }
    }

    fn map_variant(
        &self,
        parent: &CatalogEntity,
        variant: &VariantRecord,
        kind: JobKind,
    ) -> Value {
        let sku = variant.sku.clone().unwrap_or_default();
        let mut merged = parent.attributes.clone();
        merged.extend(variant.attributes.clone());
        let mut attributes = self.common_attributes(&merged, Some(variant));
        attributes.insert("sku".into(), json!(sku));
        attributes.insert("inventory_policy".into(), json!(0));
        attributes.insert("inventory_quantity".into(), json!(0));

        match kind {
            JobKind::VariantCreated => {
                attributes.insert("external_id".into(), json!(sku));
                attributes.insert("catalog_type".into(), json!(self.catalog_type));
                attributes.insert("integration_type".into(), json!(self.integration_type));
                json!({
                    "type": VARIANT_TYPE,
                    "attributes": attributes,
                    "relationships": {
                        "item": { "data": { "type": ITEM_TYPE, "id": self.keys.item_key(&parent.id) } }
                    }
                })
            }
            _ => json!({
                "type": VARIANT_TYPE,
                "id": self.keys.variant_key(&sku),
                "attributes": attributes,
            }),
        }
    }

    fn map_variant_deletion(&self, _parent: &EntityId, target_id: &str) -> Value {
        json!({ "type": VARIANT_TYPE, "id": target_id })
    }

    fn map_item_deletion(&self, target_id: &str) -> Value {
        json!({ "type": ITEM_TYPE, "id": target_id })
    }
}

/// First string-valued attribute among `keys`.
fn text(attrs: &Attributes, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| attrs.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

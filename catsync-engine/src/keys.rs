//! Existence key formatting.
//!
//! The target identifies synced records by a composite key: a catalog-scope
//! prefix followed by the source identifier. Whether one prefix holds for
//! every catalog scope is not guaranteed, so the format is injectable.

use catsync_types::EntityId;
use serde::{Deserialize, Serialize};

/// Prefix used by the target for custom-integration records in the default catalog.
pub const DEFAULT_KEY_PREFIX: &str = "$custom:::$default:::";

/// Formats existence keys for items and variants.
pub trait KeyFormatter: Send + Sync {
    /// Key of the item mirroring `entity_id`.
    fn item_key(&self, entity_id: &EntityId) -> String;

    /// Key of the variant mirroring `sku`.
    fn variant_key(&self, sku: &str) -> String;
}

/// Prefix-concatenation key format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixKeyFormatter {
    /// Prefix for item keys.
    pub item_prefix: String,
    /// Prefix for variant keys.
    pub variant_prefix: String,
}

impl Default for PrefixKeyFormatter {
    fn default() -> Self {
        Self {
            item_prefix: DEFAULT_KEY_PREFIX.to_string(),
            variant_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl PrefixKeyFormatter {
    /// Uses the same prefix for both key spaces.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            item_prefix: prefix.clone(),
            variant_prefix: prefix,
        }
    }
}

impl KeyFormatter for PrefixKeyFormatter {
    fn item_key(&self, entity_id: &EntityId) -> String {
        format!("{}{}", self.item_prefix, entity_id)
    }

    fn variant_key(&self, sku: &str) -> String {
        format!("{}{}", self.variant_prefix, sku)
    }
}

//! Source catalog snapshot types.
//!
//! A [`CatalogEntity`] is an immutable snapshot of one top-level record as it
//! was fetched from the source catalog, together with its nested variants.
//! The source is authoritative; nothing in the engine mutates these values.

use crate::EntityId;
use serde::{Deserialize, Serialize};

/// Free-form attribute bag carried through to the mapper untouched.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A price attached to a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// ISO 4217 currency code.
    pub currency: String,
    /// Amount in the currency's minor unit.
    pub cent_amount: i64,
    /// Digits after the decimal point, when the source states them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction_digits: Option<u32>,
}

impl Price {
    /// Creates a new price.
    pub fn new(currency: impl Into<String>, cent_amount: i64) -> Self {
        Self {
            currency: currency.into(),
            cent_amount,
            fraction_digits: None,
        }
    }

    /// Sets the fraction digits explicitly.
    #[must_use]
    pub fn with_fraction_digits(mut self, digits: u32) -> Self {
        self.fraction_digits = Some(digits);
        self
    }

    /// Digits of the minor unit: the stated value, else the ISO 4217 exponent.
    pub fn minor_unit_digits(&self) -> u32 {
        self.fraction_digits
            .unwrap_or_else(|| iso_minor_unit_digits(&self.currency))
    }

    /// Amount in major units (e.g. `1999` EUR cents is `19.99`).
    pub fn major_amount(&self) -> f64 {
        self.cent_amount as f64 / 10f64.powi(self.minor_unit_digits() as i32)
    }
}

/// ISO 4217 minor-unit exponent; two for any currency not listed.
fn iso_minor_unit_digits(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "UYI" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        "CLF" | "UYW" => 4,
        _ => 2,
    }
}

/// A SKU-level sub-record of a catalog entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    /// Stock keeping unit. Variants without a SKU cannot be keyed in the target.
    #[serde(default)]
    pub sku: Option<String>,
    /// Prices for this variant.
    #[serde(default)]
    pub prices: Vec<Price>,
    /// Image URLs for this variant.
    #[serde(default)]
    pub images: Vec<String>,
    /// Any further source attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

impl VariantRecord {
    /// Creates a variant with the given SKU and nothing else.
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: Some(sku.into()),
            ..Default::default()
        }
    }

    /// Adds a price.
    #[must_use]
    pub fn with_price(mut self, price: Price) -> Self {
        self.prices.push(price);
        self
    }

    /// Adds an image URL.
    #[must_use]
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }

    /// A variant is sync-eligible iff it has at least one price and at least
    /// one image.
    #[must_use]
    pub fn is_sync_eligible(&self) -> bool {
        !self.prices.is_empty() && !self.images.is_empty()
    }

    /// The SKU, if present and non-empty.
    pub fn key_sku(&self) -> Option<&str> {
        self.sku.as_deref().filter(|s| !s.is_empty())
    }
}

/// A top-level catalog record with nested variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntity {
    /// Source identifier.
    pub id: EntityId,
    /// Optional entity-level SKU.
    #[serde(default)]
    pub sku: Option<String>,
    /// Whether the entity has a current published representation.
    #[serde(default)]
    pub published: bool,
    /// Source attributes (title, description, slug, ...).
    #[serde(default)]
    pub attributes: Attributes,
    /// All variants, including the master variant.
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
}

impl CatalogEntity {
    /// Creates a published entity with no attributes or variants.
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            sku: None,
            published: true,
            attributes: Attributes::new(),
            variants: Vec::new(),
        }
    }

    /// Sets the published flag.
    #[must_use]
    pub fn with_published(mut self, published: bool) -> Self {
        self.published = published;
        self
    }

    /// Sets a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Appends a variant.
    #[must_use]
    pub fn with_variant(mut self, variant: VariantRecord) -> Self {
        self.variants.push(variant);
        self
    }

    /// Iterates over the sync-eligible variants in source order.
    pub fn eligible_variants(&self) -> impl Iterator<Item = &VariantRecord> {
        self.variants.iter().filter(|v| v.is_sync_eligible())
    }

    /// Returns a copy restricted to its eligible variants, or `None` when the
    /// entity is unpublished or has no eligible variant left.
    #[must_use]
    pub fn to_eligible(&self) -> Option<CatalogEntity> {
        if !self.published {
            return None;
        }
        let variants: Vec<VariantRecord> = self.eligible_variants().cloned().collect();
        if variants.is_empty() {
            return None;
        }
        Some(CatalogEntity {
            variants,
            ..self.clone()
        })
    }
}

//! Classified operations against the target platform.
//!
//! A [`JobRequest`] is the output of classification: one kind of operation
//! plus the mapped wire entries it applies to. A [`BatchJob`] is what is
//! actually sent, a payload bounded by the target's maximum batch size.
//! Kinds are never mixed within either.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The six operation kinds the target understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    ItemCreated,
    ItemUpdated,
    VariantCreated,
    VariantUpdated,
    VariantDeleted,
    ItemDeleted,
}

impl JobKind {
    /// All kinds, in declaration order.
    pub const ALL: [JobKind; 6] = [
        JobKind::ItemCreated,
        JobKind::ItemUpdated,
        JobKind::VariantCreated,
        JobKind::VariantUpdated,
        JobKind::VariantDeleted,
        JobKind::ItemDeleted,
    ];

    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobKind::ItemCreated => "itemCreated",
            JobKind::ItemUpdated => "itemUpdated",
            JobKind::VariantCreated => "variantCreated",
            JobKind::VariantUpdated => "variantUpdated",
            JobKind::VariantDeleted => "variantDeleted",
            JobKind::ItemDeleted => "itemDeleted",
        }
    }

    /// Whether this kind operates on variants.
    #[must_use]
    pub const fn is_variant(&self) -> bool {
        matches!(
            self,
            JobKind::VariantCreated | JobKind::VariantUpdated | JobKind::VariantDeleted
        )
    }

    /// Whether this kind removes records from the target.
    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        matches!(self, JobKind::VariantDeleted | JobKind::ItemDeleted)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown job kind name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job kind: {0}")]
pub struct ParseJobKindError(pub String);

impl FromStr for JobKind {
    type Err = ParseJobKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseJobKindError(s.to_string()))
    }
}

/// One classified, not yet size-bounded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// The operation kind.
    pub kind: JobKind,
    /// Parent entity, set for variant kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityId>,
    /// Mapped wire entries, one per entity or variant.
    pub payload: Vec<serde_json::Value>,
}

impl JobRequest {
    /// Creates an item-level request.
    pub fn item(kind: JobKind, payload: Vec<serde_json::Value>) -> Self {
        Self {
            kind,
            parent: None,
            payload,
        }
    }

    /// Creates a variant-level request for the given parent entity.
    pub fn variant(kind: JobKind, parent: EntityId, payload: Vec<serde_json::Value>) -> Self {
        Self {
            kind,
            parent: Some(parent),
            payload,
        }
    }

    /// Number of payload entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A size-bounded unit of work sent to the target in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    /// The operation kind shared by every entry.
    pub kind: JobKind,
    /// Mapped wire entries.
    pub payload: Vec<serde_json::Value>,
}

impl BatchJob {
    /// Creates a batch job.
    pub fn new(kind: JobKind, payload: Vec<serde_json::Value>) -> Self {
        Self { kind, payload }
    }

    /// Number of payload entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

//! Core type definitions for catsync.
//!
//! This crate defines the platform-agnostic types used throughout the
//! reconciliation engine:
//! - Entity and run identifiers
//! - Source catalog snapshots (entities and their variants)
//! - Classified job requests and size-bounded batch jobs
//!
//! Field-level mapping to a particular target schema does not belong here;
//! it lives behind the engine's `CatalogMapper` trait.

mod catalog;
mod ids;
mod job;

pub use catalog::{Attributes, CatalogEntity, Price, VariantRecord};
pub use ids::{EntityId, RunId};
pub use job::{BatchJob, JobKind, JobRequest, ParseJobKindError};


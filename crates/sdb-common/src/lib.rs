//! SDB importer common types.
//!
//! This crate provides foundational types shared across the importer crates:
//! - Snapshot file identity parsed from the `YYMMDDHH.sdb.gz` naming convention
//! - Error categories and suggested actions for structured failure reporting
//! - Schema versioning for persisted reports and bundles

pub mod error;
pub mod schema;
pub mod snapshot;

pub use error::{ErrorCategory, SuggestedAction};
pub use schema::SCHEMA_VERSION;
pub use snapshot::{
    ConversionWindow, DateToken, SnapshotFile, SnapshotNameError, CANONICAL_SUFFIX_LEN,
    DATE_TOKEN_LEN, SNAPSHOT_EXTENSION,
};

//! Schema versioning for persisted importer artifacts.

/// Schema version stamped on pass reports and diagnostic bundles.
pub const SCHEMA_VERSION: &str = "1.0.0";

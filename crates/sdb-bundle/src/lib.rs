//! Diagnostic bundle writer/reader for failed SDB imports.
//!
//! When an import fails, the working areas for that hour are packaged into a
//! single archive so the failure can be examined after the areas are removed.
//!
//! # Bundle Format
//!
//! Bundles are ZIP archives containing:
//! - `manifest.json`: Metadata, failed stage, file listing with checksums
//! - `failure.json`: Structured failure record
//! - `transitions.json`: Stage trail of the failed import
//! - `staged/`: Contents of the staging area
//! - `output/`: Converter output (CSV files, line-protocol batches)
//! - `logs/`: Conversion log
//!
//! # Example
//!
//! ```no_run
//! use sdb_bundle::{BundleReader, BundleWriter};
//! use std::path::Path;
//!
//! let mut writer = BundleWriter::new("run-1", "19031514").with_failed_stage("verified");
//! writer.add_json("failure.json", &serde_json::json!({"error": "no data"})).unwrap();
//! writer.add_dir("output", Path::new("/sdb_puller/output/19031514")).unwrap();
//! writer.write(Path::new("19031514_error.zip")).unwrap();
//!
//! let mut reader = BundleReader::open(Path::new("19031514_error.zip")).unwrap();
//! assert!(reader.verify_all().is_empty());
//! ```

pub mod error;
pub mod manifest;
pub mod reader;
pub mod writer;

pub use error::{BundleError, Result};
pub use manifest::{BundleManifest, FileEntry, OmittedEntry, BUNDLE_SCHEMA_VERSION, MANIFEST_FILE_NAME};
pub use reader::BundleReader;
pub use writer::{BundleWriter, FileType, DEFAULT_MAX_FILE_BYTES};

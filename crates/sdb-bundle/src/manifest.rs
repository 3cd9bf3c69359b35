//! Bundle manifest types and serialization.
//!
//! The manifest is the source of truth for a bundle's contents, providing:
//! - Bundle metadata (version, timestamps, run and snapshot identifiers)
//! - The pipeline stage that failed
//! - File listing with SHA-256 checksums
//! - Files left out because they exceeded the size cap

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current bundle schema version.
pub const BUNDLE_SCHEMA_VERSION: &str = "1.0.0";

/// Manifest file name within the bundle.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Bundle manifest containing metadata and file checksums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle format version.
    pub bundle_version: String,

    /// When the bundle was created.
    pub created_at: DateTime<Utc>,

    /// Import run that produced the bundle.
    pub run_id: String,

    /// `YYMMDDHH` token of the failed snapshot.
    pub date: String,

    /// Pipeline step that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,

    /// Files included in the bundle with checksums.
    pub files: Vec<FileEntry>,

    /// Files found in a captured directory but not included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omitted: Vec<OmittedEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Importer version that created this bundle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importer_version: Option<String>,
}

impl BundleManifest {
    /// Create a new manifest with required fields.
    pub fn new(run_id: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            bundle_version: BUNDLE_SCHEMA_VERSION.to_string(),
            created_at: Utc::now(),
            run_id: run_id.into(),
            date: date.into(),
            failed_stage: None,
            files: Vec::new(),
            omitted: Vec::new(),
            description: None,
            importer_version: None,
        }
    }

    pub fn with_failed_stage(mut self, stage: impl Into<String>) -> Self {
        self.failed_stage = Some(stage.into());
        self
    }

    pub fn with_importer_version(mut self, version: impl Into<String>) -> Self {
        self.importer_version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a file entry to the manifest.
    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Record a file that was left out.
    pub fn add_omitted(&mut self, entry: OmittedEntry) {
        self.omitted.push(entry);
    }

    /// Get total size of all files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Find a file by path.
    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Validate the manifest structure.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bundle_version != BUNDLE_SCHEMA_VERSION {
            return Err(crate::BundleError::UnsupportedVersion {
                version: self.bundle_version.clone(),
                supported: BUNDLE_SCHEMA_VERSION.to_string(),
            });
        }

        if self.run_id.is_empty() {
            return Err(crate::BundleError::CorruptedManifest(
                "run_id is empty".to_string(),
            ));
        }

        if self.date.is_empty() {
            return Err(crate::BundleError::CorruptedManifest(
                "date is empty".to_string(),
            ));
        }

        for file in &self.files {
            if file.path.is_empty() {
                return Err(crate::BundleError::CorruptedManifest(
                    "file entry has empty path".to_string(),
                ));
            }
            if file.sha256.len() != 64 {
                return Err(crate::BundleError::CorruptedManifest(format!(
                    "file '{}' has invalid checksum length",
                    file.path
                )));
            }
        }

        Ok(())
    }

    /// Sort files for deterministic ordering.
    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
        self.omitted.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Serialize to JSON with consistent formatting.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// File entry in the manifest with checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path within the bundle (relative).
    pub path: String,

    /// SHA-256 checksum (64 hex characters).
    pub sha256: String,

    /// Size in bytes.
    pub bytes: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
            bytes,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Compute SHA-256 checksum of data.
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify the checksum against data.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute_checksum(data) == self.sha256
    }
}

/// A file seen while capturing a directory but not packaged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmittedEntry {
    pub path: String,
    pub bytes: u64,
    pub reason: String,
}

//! Bundle writer for creating `{date}_error.zip` files.
//!
//! Creates ZIP archives with manifest and checksums.

use crate::manifest::MANIFEST_FILE_NAME;
use crate::{BundleError, BundleManifest, FileEntry, OmittedEntry, Result};
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Largest single file captured from a working area.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// File type hints for MIME type assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Json,
    Csv,
    LineProtocol,
    Log,
    Gzip,
    Binary,
}

impl FileType {
    fn mime_type(&self) -> &'static str {
        match self {
            FileType::Json => "application/json",
            FileType::Csv => "text/csv",
            FileType::LineProtocol => "text/plain; charset=utf-8",
            FileType::Log => "text/plain",
            FileType::Gzip => "application/gzip",
            FileType::Binary => "application/octet-stream",
        }
    }

    pub fn from_path(path: &str) -> Self {
        if path.ends_with(".json") {
            FileType::Json
        } else if path.ends_with(".csv") {
            FileType::Csv
        } else if path.ends_with(".flx") {
            FileType::LineProtocol
        } else if path.ends_with(".log") {
            FileType::Log
        } else if path.ends_with(".gz") {
            FileType::Gzip
        } else {
            FileType::Binary
        }
    }
}

/// Builder for diagnostic bundles.
pub struct BundleWriter {
    manifest: BundleManifest,
    files: Vec<(String, Vec<u8>)>,
    max_file_bytes: u64,
}

impl BundleWriter {
    /// Create a new bundle writer.
    pub fn new(run_id: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            manifest: BundleManifest::new(run_id, date),
            files: Vec::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_failed_stage(mut self, stage: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_failed_stage(stage);
        self
    }

    pub fn with_importer_version(mut self, version: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_importer_version(version);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_description(description);
        self
    }

    /// Cap the size of files captured by [`BundleWriter::add_dir`].
    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    /// Add a file to the bundle with automatic checksum.
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>, file_type: Option<FileType>) {
        let path = path.into();
        let checksum = FileEntry::compute_checksum(&data);
        let bytes = data.len() as u64;
        let file_type = file_type.unwrap_or_else(|| FileType::from_path(&path));

        debug!(path = %path, bytes, "Added file to bundle");

        self.manifest
            .add_file(FileEntry::new(&path, checksum, bytes).with_mime_type(file_type.mime_type()));
        self.files.push((path, data));
    }

    /// Add a JSON-serializable value as a file.
    pub fn add_json<T: serde::Serialize>(&mut self, path: impl Into<String>, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.add_file(path, json.into_bytes(), Some(FileType::Json));
        Ok(())
    }

    /// Add a file from disk under `path`. A missing source is skipped.
    pub fn add_path(&mut self, path: impl Into<String>, source: &Path) -> Result<bool> {
        if !source.is_file() {
            return Ok(false);
        }
        let data = std::fs::read(source)?;
        self.add_file(path, data, None);
        Ok(true)
    }

    /// Capture every regular file below `dir` under `prefix/`.
    ///
    /// A missing directory adds nothing. Files above the size cap are listed
    /// in the manifest's `omitted` section instead. Returns the number of
    /// files added.
    pub fn add_dir(&mut self, prefix: &str, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }

        let mut added = 0;
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let bundle_path = format!("{}/{}", prefix.trim_end_matches('/'), parts.join("/"));

            let bytes = entry.metadata()?.len();
            if bytes > self.max_file_bytes {
                debug!(path = %bundle_path, bytes, "Omitted oversized file from bundle");
                self.manifest.add_omitted(OmittedEntry {
                    path: bundle_path,
                    bytes,
                    reason: format!("exceeds {} byte cap", self.max_file_bytes),
                });
                continue;
            }

            let data = std::fs::read(entry.path())?;
            self.add_file(bundle_path, data, None);
            added += 1;
        }

        Ok(added)
    }

    /// Get the current manifest (for inspection before writing).
    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Get total size in bytes before compression.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|(_, data)| data.len() as u64).sum()
    }

    /// Get file count (not including manifest).
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Write the bundle to a file.
    pub fn write(mut self, path: &Path) -> Result<BundleManifest> {
        let file = File::create(path)?;
        self.write_archive(file)?;

        info!(
            path = %path.display(),
            files = self.files.len(),
            bytes = self.total_bytes(),
            date = %self.manifest.date,
            "Bundle written"
        );

        Ok(self.manifest)
    }

    /// Write the bundle to a byte vector (for in-memory use).
    pub fn write_to_vec(mut self) -> Result<(Vec<u8>, BundleManifest)> {
        let mut buffer = Cursor::new(Vec::new());
        self.write_archive(&mut buffer)?;
        let bytes = buffer.into_inner();

        info!(
            files = self.files.len(),
            compressed_bytes = bytes.len(),
            uncompressed_bytes = self.total_bytes(),
            "Bundle written to memory"
        );

        Ok((bytes, self.manifest))
    }

    fn write_archive<W: Write + Seek>(&mut self, sink: W) -> Result<()> {
        if self.files.is_empty() {
            return Err(BundleError::EmptyBundle);
        }

        // Sort files for deterministic ordering
        self.manifest.sort_files();
        self.files.sort_by(|a, b| a.0.cmp(&b.0));

        let manifest_json = self.manifest.to_json()?;

        let mut zip = ZipWriter::new(sink);
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Write manifest first
        zip.start_file(MANIFEST_FILE_NAME, options)?;
        zip.write_all(manifest_json.as_bytes())?;

        for (file_path, data) in &self.files {
            zip.start_file(file_path.as_str(), options)?;
            zip.write_all(data)?;
        }

        zip.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundle_writer_new() {
        let writer = BundleWriter::new("run-123", "19031514");
        assert_eq!(writer.manifest().run_id, "run-123");
        assert_eq!(writer.file_count(), 0);
    }

    #[test]
    fn test_bundle_writer_add_file() {
        let mut writer = BundleWriter::new("run-123", "19031514");
        writer.add_file("output/1.csv", b"1,2\n".to_vec(), None);

        assert_eq!(writer.file_count(), 1);
        assert_eq!(writer.total_bytes(), 4);
        let entry = writer.manifest().find_file("output/1.csv").unwrap();
        assert_eq!(entry.mime_type.as_deref(), Some("text/csv"));
    }

    #[test]
    fn test_bundle_writer_add_json() {
        let mut writer = BundleWriter::new("run-123", "19031514");
        writer
            .add_json("failure.json", &serde_json::json!({"stage": "verified"}))
            .unwrap();
        assert!(writer.manifest().find_file("failure.json").is_some());
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path("output/1.flx"), FileType::LineProtocol);
        assert_eq!(FileType::from_path("staged/19031514.sdb.gz"), FileType::Gzip);
        assert_eq!(FileType::from_path("logs/19031514Std.log"), FileType::Log);
        assert_eq!(FileType::from_path("blob"), FileType::Binary);
    }

    #[test]
    fn test_add_dir_walks_recursively() {
        let tmp = TempDir::new().unwrap();
        let area = tmp.path().join("area");
        std::fs::create_dir_all(area.join("nested")).unwrap();
        std::fs::write(area.join("1.csv"), "a").unwrap();
        std::fs::write(area.join("nested").join("2.csv"), "b").unwrap();

        let mut writer = BundleWriter::new("run-123", "19031514");
        let added = writer.add_dir("output/", &area).unwrap();

        assert_eq!(added, 2);
        assert!(writer.manifest().find_file("output/1.csv").is_some());
        assert!(writer.manifest().find_file("output/nested/2.csv").is_some());
    }

    #[test]
    fn test_add_dir_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BundleWriter::new("run-123", "19031514");
        assert_eq!(writer.add_dir("staged", &tmp.path().join("none")).unwrap(), 0);
    }

    #[test]
    fn test_add_dir_omits_oversized() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("big.sdb.gz"), vec![0u8; 32]).unwrap();
        std::fs::write(tmp.path().join("small.csv"), "x").unwrap();

        let mut writer = BundleWriter::new("run-123", "19031514").with_max_file_bytes(16);
        assert_eq!(writer.add_dir("staged", tmp.path()).unwrap(), 1);
        assert_eq!(writer.manifest().omitted.len(), 1);
        assert_eq!(writer.manifest().omitted[0].path, "staged/big.sdb.gz");
        assert_eq!(writer.manifest().omitted[0].bytes, 32);
    }

    #[test]
    fn test_add_path_skips_missing() {
        let tmp = TempDir::new().unwrap();
        let mut writer = BundleWriter::new("run-123", "19031514");
        assert!(!writer.add_path("logs/x.log", &tmp.path().join("x.log")).unwrap());
        assert_eq!(writer.file_count(), 0);
    }

    #[test]
    fn test_bundle_writer_empty_fails() {
        let writer = BundleWriter::new("run-123", "19031514");
        assert!(matches!(writer.write_to_vec(), Err(BundleError::EmptyBundle)));
    }

    #[test]
    fn test_bundle_writer_write_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("19031514_error.zip");

        let mut writer = BundleWriter::new("run-123", "19031514");
        writer.add_file("failure.json", b"{}".to_vec(), None);
        let manifest = writer.write(&path).unwrap();

        assert!(path.exists());
        assert_eq!(manifest.file_count(), 1);
    }
}

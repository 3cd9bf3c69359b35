//! Bundle reader for opening and verifying diagnostic bundles.

use crate::manifest::MANIFEST_FILE_NAME;
use crate::{BundleError, BundleManifest, FileEntry, Result, BUNDLE_SCHEMA_VERSION};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Reader for diagnostic bundles with verification.
pub struct BundleReader<R: Read + Seek> {
    manifest: BundleManifest,
    archive: ZipArchive<R>,
    verified: HashSet<String>,
}

impl BundleReader<File> {
    /// Open a bundle from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl BundleReader<Cursor<Vec<u8>>> {
    /// Open a bundle from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> BundleReader<R> {
    /// Create a reader from any Read + Seek source.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let manifest = Self::read_manifest(&mut archive)?;
        manifest.validate()?;

        info!(
            run_id = %manifest.run_id,
            date = %manifest.date,
            files = manifest.file_count(),
            "Bundle opened"
        );

        Ok(Self {
            manifest,
            archive,
            verified: HashSet::new(),
        })
    }

    fn read_manifest(archive: &mut ZipArchive<R>) -> Result<BundleManifest> {
        let mut manifest_file = archive
            .by_name(MANIFEST_FILE_NAME)
            .map_err(|_| BundleError::MissingFile(MANIFEST_FILE_NAME.to_string()))?;

        let mut json = String::new();
        manifest_file.read_to_string(&mut json)?;

        let manifest = BundleManifest::from_json(&json)?;
        if manifest.bundle_version != BUNDLE_SCHEMA_VERSION {
            warn!(
                bundle_version = %manifest.bundle_version,
                supported = %BUNDLE_SCHEMA_VERSION,
                "Bundle version mismatch"
            );
        }

        Ok(manifest)
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// List all files in the bundle.
    pub fn files(&self) -> &[FileEntry] {
        &self.manifest.files
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.manifest.find_file(path).is_some()
    }

    /// Read a file from the bundle without verification.
    ///
    /// Use `read_verified` for integrity-checked reads.
    pub fn read_raw(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|_| BundleError::FileNotFound(path.to_string()))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        debug!(path, bytes = data.len(), "Read file from bundle (unverified)");
        Ok(data)
    }

    /// Read a file with checksum verification.
    pub fn read_verified(&mut self, path: &str) -> Result<Vec<u8>> {
        let expected = self
            .manifest
            .find_file(path)
            .ok_or_else(|| BundleError::FileNotFound(path.to_string()))?
            .sha256
            .clone();

        let data = self.read_raw(path)?;

        let actual = FileEntry::compute_checksum(&data);
        if actual != expected {
            return Err(BundleError::ChecksumMismatch {
                path: path.to_string(),
                expected,
                actual,
            });
        }

        self.verified.insert(path.to_string());
        debug!(path, "File verified");
        Ok(data)
    }

    pub fn is_verified(&self, path: &str) -> bool {
        self.verified.contains(path)
    }

    /// Verify all files in the bundle.
    ///
    /// Returns list of paths that failed verification.
    pub fn verify_all(&mut self) -> Vec<String> {
        let paths: Vec<String> = self.manifest.files.iter().map(|f| f.path.clone()).collect();

        let mut failures = Vec::new();
        for path in paths {
            if let Err(e) = self.read_verified(&path) {
                warn!(path = %path, error = %e, "Verification failed");
                failures.push(path);
            }
        }

        if failures.is_empty() {
            info!("All files verified");
        }

        failures
    }

    /// Read and parse a JSON file.
    pub fn read_json<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let data = self.read_verified(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BundleWriter;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn sample_bundle() -> Vec<u8> {
        let mut writer = BundleWriter::new("run-123", "19031514").with_failed_stage("parsed");
        writer
            .add_json("failure.json", &serde_json::json!({"error": "malformed row"}))
            .unwrap();
        writer.add_file("output/1.csv", b"1552658400,5\n".to_vec(), None);
        writer.write_to_vec().unwrap().0
    }

    #[test]
    fn test_reader_opens_written_bundle() {
        let mut reader = BundleReader::from_bytes(sample_bundle()).unwrap();
        assert_eq!(reader.manifest().date, "19031514");
        assert_eq!(reader.manifest().failed_stage.as_deref(), Some("parsed"));
        assert_eq!(reader.files().len(), 2);
        assert!(reader.has_file("output/1.csv"));
        assert!(reader.verify_all().is_empty());
        assert!(reader.is_verified("failure.json"));
    }

    #[test]
    fn test_reader_read_json() {
        let mut reader = BundleReader::from_bytes(sample_bundle()).unwrap();
        let value: serde_json::Value = reader.read_json("failure.json").unwrap();
        assert_eq!(value["error"], "malformed row");
    }

    #[test]
    fn test_reader_unknown_file() {
        let mut reader = BundleReader::from_bytes(sample_bundle()).unwrap();
        assert!(matches!(
            reader.read_verified("output/2.csv"),
            Err(BundleError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_reader_detects_tampering() {
        let mut manifest = BundleManifest::new("run-123", "19031514");
        manifest.add_file(FileEntry::new(
            "output/1.csv",
            FileEntry::compute_checksum(b"original"),
            8,
        ));

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options: FileOptions<'_, ()> = FileOptions::default();
            zip.start_file(MANIFEST_FILE_NAME, options).unwrap();
            zip.write_all(manifest.to_json().unwrap().as_bytes()).unwrap();
            zip.start_file("output/1.csv", options).unwrap();
            zip.write_all(b"tampered").unwrap();
            zip.finish().unwrap();
        }

        let mut reader = BundleReader::from_bytes(buffer.into_inner()).unwrap();
        assert!(matches!(
            reader.read_verified("output/1.csv"),
            Err(BundleError::ChecksumMismatch { .. })
        ));
        assert_eq!(reader.verify_all(), vec!["output/1.csv".to_string()]);
    }

    #[test]
    fn test_reader_requires_manifest() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buffer);
            let options: FileOptions<'_, ()> = FileOptions::default();
            zip.start_file("failure.json", options).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.finish().unwrap();
        }
        assert!(matches!(
            BundleReader::from_bytes(buffer.into_inner()),
            Err(BundleError::MissingFile(_))
        ));
    }
}

//! Diagnostic bundle errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("bundle I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bundle archive is unreadable: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("bundle JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    /// A directory added to the bundle could not be walked.
    #[error("cannot walk {0}")]
    Walk(#[from] walkdir::Error),

    #[error("'{path}' failed verification: manifest says {expected}, content hashes to {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("bundle has no {0}")]
    MissingFile(String),

    #[error("bundle version {version} is not readable by this build (reads {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("manifest is corrupt: {0}")]
    CorruptedManifest(String),

    #[error("'{0}' is not listed in the bundle")]
    FileNotFound(String),

    /// Nothing was captured for the failed import.
    #[error("refusing to write an empty bundle")]
    EmptyBundle,
}

impl BundleError {
    /// Stable numeric code, in the range shared with import errors.
    pub fn code(&self) -> u32 {
        match self {
            BundleError::Io(_) | BundleError::Walk(_) => 70,
            BundleError::Zip(_) => 71,
            BundleError::Json(_) | BundleError::CorruptedManifest(_) => 72,
            BundleError::ChecksumMismatch { .. } => 73,
            BundleError::MissingFile(_) | BundleError::FileNotFound(_) => 74,
            BundleError::UnsupportedVersion { .. } => 75,
            BundleError::EmptyBundle => 76,
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;

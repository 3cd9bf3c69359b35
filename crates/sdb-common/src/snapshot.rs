//! Snapshot file identity.
//!
//! An hourly snapshot is named `YYMMDDHH.sdb.gz`. The 8-digit date token is
//! the logical identity of an import unit: two files carrying the same token
//! are the same hour regardless of the directory they were found in. The last
//! 15 characters of the file name (token + extension) form the canonical
//! suffix recorded in the import ledger.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fixed extension carried by every snapshot file.
pub const SNAPSHOT_EXTENSION: &str = ".sdb.gz";

/// Number of digits in the `YYMMDDHH` token.
pub const DATE_TOKEN_LEN: usize = 8;

/// Length of the canonical `YYMMDDHH.sdb.gz` suffix.
pub const CANONICAL_SUFFIX_LEN: usize = DATE_TOKEN_LEN + SNAPSHOT_EXTENSION.len();

/// Errors raised while deriving a snapshot identity from a file name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotNameError {
    #[error("path has no UTF-8 file name: {0}")]
    NoFileName(String),

    #[error("'{name}' does not end in {SNAPSHOT_EXTENSION}")]
    MissingExtension { name: String },

    #[error("'{name}' does not carry an 8-digit date token before the extension")]
    BadToken { name: String },

    #[error("{field} {value:02} out of range in '{token}'")]
    OutOfRange {
        field: &'static str,
        value: u8,
        token: String,
    },
}

/// Two-digit year, month, day and hour parsed from a snapshot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateToken {
    year: u8,
    month: u8,
    day: u8,
    hour: u8,
}

impl DateToken {
    /// Parse an 8-digit `YYMMDDHH` token.
    pub fn parse(token: &str) -> Result<Self, SnapshotNameError> {
        let bytes = token.as_bytes();
        if bytes.len() != DATE_TOKEN_LEN || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(SnapshotNameError::BadToken {
                name: token.to_string(),
            });
        }

        let pair = |i: usize| (bytes[i] - b'0') * 10 + (bytes[i + 1] - b'0');
        let parsed = DateToken {
            year: pair(0),
            month: pair(2),
            day: pair(4),
            hour: pair(6),
        };

        let out_of_range = |field, value| SnapshotNameError::OutOfRange {
            field,
            value,
            token: token.to_string(),
        };
        if !(1..=12).contains(&parsed.month) {
            return Err(out_of_range("month", parsed.month));
        }
        if !(1..=31).contains(&parsed.day) {
            return Err(out_of_range("day", parsed.day));
        }
        if parsed.hour > 23 {
            return Err(out_of_range("hour", parsed.hour));
        }

        Ok(parsed)
    }

    pub fn year(&self) -> u8 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Exclusive end hour of the conversion window. Hour 23 yields 24.
    pub fn hour_end(&self) -> u8 {
        self.hour + 1
    }

    /// Four-digit year, assuming the 2000s.
    pub fn full_year(&self) -> i32 {
        2000 + i32::from(self.year)
    }

    /// Start of the hour this token names, or `None` for impossible dates
    /// such as 31 February.
    pub fn hour_start(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            self.full_year(),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(u32::from(self.hour), 0, 0)
    }

    /// Zero-padded argument tuple handed to the external converter.
    pub fn window(&self) -> ConversionWindow {
        ConversionWindow {
            year: format!("{:02}", self.year),
            month: format!("{:02}", self.month),
            day: format!("{:02}", self.day),
            hour: format!("{:02}", self.hour),
            hour_end: format!("{:02}", self.hour_end()),
        }
    }
}

impl fmt::Display for DateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour
        )
    }
}

/// `(year, month, day, hour, hour_end)` as zero-padded strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionWindow {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub hour_end: String,
}

/// One hour of raw telemetry on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotFile {
    path: PathBuf,
    token: DateToken,
}

impl SnapshotFile {
    /// Build a snapshot identity from the fixed-width suffix of `path`.
    ///
    /// Only the last 15 characters of the file name are inspected, so any
    /// prefix is tolerated here; the catalog applies the stricter whole-name
    /// filter.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, SnapshotNameError> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SnapshotNameError::NoFileName(path.display().to_string()))?;

        if !name.ends_with(SNAPSHOT_EXTENSION) {
            return Err(SnapshotNameError::MissingExtension {
                name: name.to_string(),
            });
        }
        if name.len() < CANONICAL_SUFFIX_LEN || !name.is_char_boundary(name.len() - CANONICAL_SUFFIX_LEN) {
            return Err(SnapshotNameError::BadToken {
                name: name.to_string(),
            });
        }

        let start = name.len() - CANONICAL_SUFFIX_LEN;
        let token = DateToken::parse(&name[start..start + DATE_TOKEN_LEN]).map_err(|e| match e {
            SnapshotNameError::BadToken { .. } => SnapshotNameError::BadToken {
                name: name.to_string(),
            },
            other => other,
        })?;

        Ok(SnapshotFile { path, token })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> DateToken {
        self.token
    }

    /// The `YYMMDDHH` token; also the name of the per-date working areas.
    pub fn date(&self) -> String {
        self.token.to_string()
    }

    /// Canonical `YYMMDDHH.sdb.gz` suffix used for ledger membership.
    pub fn canonical_name(&self) -> String {
        format!("{}{}", self.token, SNAPSHOT_EXTENSION)
    }

    /// File name as found on disk.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for SnapshotFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

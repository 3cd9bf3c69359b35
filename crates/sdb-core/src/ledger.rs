//! Append-only import ledger.
//!
//! One canonical `YYMMDDHH.sdb.gz` suffix per line. A snapshot counts as
//! imported when its suffix appears anywhere in a line, so ledgers written by
//! older tooling with full paths still match. Lines are only ever appended.

use sdb_common::SnapshotFile;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::logging::event_names;

/// Errors raised by ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to access ledger {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock ledger {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of [`ImportLedger::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    Appended,
    AlreadyPresent,
}

/// Handle on the ledger file. Cheap to clone; holds no open descriptor.
#[derive(Debug, Clone)]
pub struct ImportLedger {
    path: PathBuf,
}

impl ImportLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_content(&self) -> Result<String, LedgerError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Whether `file` has been committed.
    pub fn seen(&self, file: &SnapshotFile) -> Result<bool, LedgerError> {
        Ok(self.snapshot()?.contains(file))
    }

    /// Point-in-time copy of the ledger for bulk membership checks.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, LedgerError> {
        Ok(LedgerSnapshot::from_content(&self.read_content()?))
    }

    /// Non-empty lines in file order.
    pub fn entries(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.snapshot()?.lines)
    }

    /// Append `file`'s canonical suffix unless it is already present.
    ///
    /// The check and the append happen under an exclusive `flock`, so
    /// concurrent committers (threads or processes) never interleave lines or
    /// record the same snapshot twice.
    pub fn commit(&self, file: &SnapshotFile) -> Result<CommitResult, LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let handle = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let _lock = LedgerLock::acquire(&handle, &self.path)?;

        let mut io: &File = &handle;
        let mut content = String::new();
        io.seek(SeekFrom::Start(0))
            .and_then(|_| io.read_to_string(&mut content))
            .map_err(|e| self.io_err(e))?;

        if LedgerSnapshot::from_content(&content).contains(file) {
            debug!(file = %file.canonical_name(), "Ledger already records snapshot");
            return Ok(CommitResult::AlreadyPresent);
        }

        // A crash can leave an unterminated line behind; never glue onto it.
        let mut line = String::new();
        if !content.is_empty() && !content.ends_with('\n') {
            line.push('\n');
        }
        line.push_str(&file.canonical_name());
        line.push('\n');

        io.write_all(line.as_bytes())
            .and_then(|_| handle.sync_data())
            .map_err(|e| self.io_err(e))?;

        info!(
            target: event_names::LEDGER_COMMITTED,
            file = %file.canonical_name(),
            ledger = %self.path.display(),
            "Snapshot recorded in ledger"
        );
        Ok(CommitResult::Appended)
    }
}

/// In-memory copy of ledger lines.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    lines: Vec<String>,
}

impl LedgerSnapshot {
    fn from_content(content: &str) -> Self {
        Self {
            lines: content
                .lines()
                .map(str::trim_end)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Substring match of the canonical suffix against every line.
    pub fn contains(&self, file: &SnapshotFile) -> bool {
        self.contains_name(&file.canonical_name())
    }

    pub fn contains_name(&self, canonical_name: &str) -> bool {
        self.lines.iter().any(|line| line.contains(canonical_name))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Exclusive advisory lock held for the lifetime of the guard.
struct LedgerLock<'a> {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: &'a File,
}

impl<'a> LedgerLock<'a> {
    fn acquire(file: &'a File, path: &Path) -> Result<Self, LedgerError> {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            loop {
                // LOCK_EX blocks until every other holder releases.
                let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
                if result == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(LedgerError::Lock {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        }
        #[cfg(not(unix))]
        let _ = path;

        Ok(Self { file })
    }
}

impl Drop for LedgerLock<'_> {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn snapshot(name: &str) -> SnapshotFile {
        SnapshotFile::from_path(format!("/sdb/{name}")).unwrap()
    }

    #[test]
    fn missing_ledger_has_seen_nothing() {
        let tmp = TempDir::new().unwrap();
        let ledger = ImportLedger::new(tmp.path().join("imported.txt"));
        assert!(!ledger.seen(&snapshot("19031514.sdb.gz")).unwrap());
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn commit_then_seen() {
        let tmp = TempDir::new().unwrap();
        let ledger = ImportLedger::new(tmp.path().join("log").join("imported.txt"));
        let file = snapshot("19031514.sdb.gz");

        assert_eq!(ledger.commit(&file).unwrap(), CommitResult::Appended);
        assert!(ledger.seen(&file).unwrap());
        assert!(!ledger.seen(&snapshot("19031515.sdb.gz")).unwrap());
        assert_eq!(
            std::fs::read_to_string(ledger.path()).unwrap(),
            "19031514.sdb.gz\n"
        );
    }

    #[test]
    fn second_commit_is_noop() {
        let tmp = TempDir::new().unwrap();
        let ledger = ImportLedger::new(tmp.path().join("imported.txt"));
        let file = snapshot("19031514.sdb.gz");

        ledger.commit(&file).unwrap();
        assert_eq!(ledger.commit(&file).unwrap(), CommitResult::AlreadyPresent);
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn legacy_full_path_lines_match() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imported.txt");
        std::fs::write(&path, "/sdb/2019/03/19031514.sdb.gz\n").unwrap();

        let ledger = ImportLedger::new(&path);
        assert!(ledger.seen(&snapshot("19031514.sdb.gz")).unwrap());
    }

    #[test]
    fn partial_line_is_not_seen_and_not_glued() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imported.txt");
        std::fs::write(&path, "1903151").unwrap();

        let ledger = ImportLedger::new(&path);
        let file = snapshot("19031514.sdb.gz");
        assert!(!ledger.seen(&file).unwrap());

        ledger.commit(&file).unwrap();
        assert_eq!(
            ledger.entries().unwrap(),
            vec!["1903151".to_string(), "19031514.sdb.gz".to_string()]
        );
    }

    #[test]
    fn concurrent_commits_write_whole_lines() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(ImportLedger::new(tmp.path().join("imported.txt")));

        std::thread::scope(|scope| {
            for hour in 0..16u8 {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || {
                    let file = snapshot(&format!("190315{:02}.sdb.gz", hour));
                    ledger.commit(&file).unwrap();
                    ledger.commit(&file).unwrap();
                });
            }
        });

        let mut entries = ledger.entries().unwrap();
        entries.sort();
        let expected: Vec<String> = (0..16u8).map(|h| format!("190315{:02}.sdb.gz", h)).collect();
        assert_eq!(entries, expected);
    }
}

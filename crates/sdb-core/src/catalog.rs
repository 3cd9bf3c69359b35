//! Snapshot discovery and ordering.
//!
//! # Discovery Rules
//!
//! - Walks the snapshot root recursively without following symlinks
//! - A file is a candidate iff its whole name matches `^\d{8}\.sdb\.gz$`
//! - Unreadable entries are skipped
//! - Results are sorted by path so repeated scans agree
//!
//! Batch processing order uses modification time ([`sort_by_recency`]) while
//! "latest file" polling uses change time ([`most_recent`]).

use chrono::Datelike;
use regex::Regex;
use sdb_common::{DateToken, SnapshotFile};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

use crate::ledger::{ImportLedger, LedgerError};

fn snapshot_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{8}\.sdb\.gz$").expect("valid snapshot name pattern"))
}

/// Whether `name` is a canonical snapshot file name.
pub fn is_snapshot_name(name: &str) -> bool {
    snapshot_name_pattern().is_match(name)
}

/// Find every snapshot below `root`.
pub fn discover(root: &Path) -> Vec<SnapshotFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable catalog entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_snapshot_name(name) {
            continue;
        }

        match SnapshotFile::from_path(entry.path()) {
            Ok(file) => files.push(file),
            Err(e) => debug!(path = %entry.path().display(), error = %e, "Skipping invalid snapshot name"),
        }
    }

    files.sort_by(|a, b| a.path().cmp(b.path()));
    debug!(root = %root.display(), found = files.len(), "Catalog scan complete");
    files
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Change time as `(seconds, nanoseconds)`.
#[cfg(unix)]
fn changed(path: &Path) -> (i64, i64) {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path)
        .map(|m| (m.ctime(), m.ctime_nsec()))
        .unwrap_or((i64::MIN, 0))
}

#[cfg(not(unix))]
fn changed(path: &Path) -> (i64, i64) {
    let mtime = modified(path)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    (mtime.as_secs() as i64, i64::from(mtime.subsec_nanos()))
}

/// Newest modification time first; equal times fall back to the newest
/// date token.
pub fn sort_by_recency(mut files: Vec<SnapshotFile>) -> Vec<SnapshotFile> {
    let mut keyed: Vec<(SystemTime, SnapshotFile)> =
        files.drain(..).map(|f| (modified(f.path()), f)).collect();
    keyed.sort_by(|(ta, a), (tb, b)| tb.cmp(ta).then_with(|| b.token().cmp(&a.token())));
    keyed.into_iter().map(|(_, f)| f).collect()
}

/// The file with the greatest change time.
pub fn most_recent(files: &[SnapshotFile]) -> Option<&SnapshotFile> {
    files
        .iter()
        .max_by_key(|f| (changed(f.path()), f.token()))
}

/// Keep files whose two-digit year lies in `[min_year, current year % 100]`.
pub fn prune(files: Vec<SnapshotFile>, min_year: u8) -> Vec<SnapshotFile> {
    let current = (chrono::Local::now().year() % 100) as u8;
    prune_at(files, min_year, current)
}

/// [`prune`] with an explicit current two-digit year.
pub fn prune_at(files: Vec<SnapshotFile>, min_year: u8, current_year: u8) -> Vec<SnapshotFile> {
    files
        .into_iter()
        .filter(|f| (min_year..=current_year).contains(&f.token().year()))
        .collect()
}

/// Files not yet in the ledger, one per date token (first occurrence wins).
pub fn pending(files: Vec<SnapshotFile>, ledger: &ImportLedger) -> Result<Vec<SnapshotFile>, LedgerError> {
    let imported = ledger.snapshot()?;
    let mut seen_tokens: HashSet<DateToken> = HashSet::new();

    Ok(files
        .into_iter()
        .filter(|f| !imported.contains(f))
        .filter(|f| seen_tokens.insert(f.token()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    fn snapshot(name: &str) -> SnapshotFile {
        SnapshotFile::from_path(format!("/sdb/{name}")).unwrap()
    }

    #[test]
    fn name_pattern_is_anchored() {
        assert!(is_snapshot_name("19031514.sdb.gz"));
        assert!(!is_snapshot_name("x19031514.sdb.gz"));
        assert!(!is_snapshot_name("19031514.sdb.gz.tmp"));
        assert!(!is_snapshot_name("1903151.sdb.gz"));
        assert!(!is_snapshot_name("19031514.sdb"));
    }

    #[test]
    fn discover_walks_and_filters() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("2019/03/19031514.sdb.gz"));
        touch(&tmp.path().join("2019/03/19031515.sdb.gz"));
        touch(&tmp.path().join("2019/03/notes.txt"));
        touch(&tmp.path().join("2019/03/copy-19031516.sdb.gz"));
        touch(&tmp.path().join("19139914.sdb.gz"));
        std::fs::create_dir_all(tmp.path().join("19031517.sdb.gz")).unwrap();

        let found = discover(tmp.path());
        let names: Vec<String> = found.iter().map(|f| f.date()).collect();
        assert_eq!(names, vec!["19031514", "19031515"]);
    }

    #[test]
    fn discover_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(discover(&tmp.path().join("absent")).is_empty());
    }

    #[test]
    fn prune_keeps_inclusive_range() {
        let files = vec![
            snapshot("16010100.sdb.gz"),
            snapshot("17010100.sdb.gz"),
            snapshot("19010100.sdb.gz"),
            snapshot("21010100.sdb.gz"),
        ];
        let kept: Vec<u8> = prune_at(files, 17, 19)
            .iter()
            .map(|f| f.token().year())
            .collect();
        assert_eq!(kept, vec![17, 19]);
    }

    #[test]
    fn pending_skips_ledger_and_duplicates() {
        let tmp = TempDir::new().unwrap();
        let ledger = ImportLedger::new(tmp.path().join("imported.txt"));
        ledger.commit(&snapshot("19031514.sdb.gz")).unwrap();

        let files = vec![
            snapshot("19031514.sdb.gz"),
            SnapshotFile::from_path("/sdb/a/19031515.sdb.gz").unwrap(),
            SnapshotFile::from_path("/sdb/b/19031515.sdb.gz").unwrap(),
            snapshot("19031516.sdb.gz"),
        ];
        let todo = pending(files, &ledger).unwrap();

        assert_eq!(todo.len(), 2);
        assert_eq!(todo[0].path(), Path::new("/sdb/a/19031515.sdb.gz"));
        assert_eq!(todo[1].date(), "19031516");
    }

    #[test]
    fn most_recent_of_empty_is_none() {
        assert!(most_recent(&[]).is_none());
    }
}

//! Per-date staging and output areas.
//!
//! Each import owns `scratch_dir/{date}` and `output_dir/{date}` for its
//! lifetime. Ownership is an exclusive `flock` on `scratch_dir/{date}/.claim`
//! held until the [`DateWorkspace`] is dropped, so a pipeline that died
//! leaves a claim nobody holds. Such stale areas are cleared and restaged;
//! only a live holder makes the date busy.

use sdb_common::SnapshotFile;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::logging::event_names;

/// Lock file inside the scratch area.
pub const CLAIM_FILE: &str = ".claim";

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("date {date} is already being processed ({})", path.display())]
    Busy { date: String, path: PathBuf },

    #[error("workspace I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WorkspaceError {
    let path = path.to_path_buf();
    move |source| WorkspaceError::Io { path, source }
}

/// Exclusive advisory lock on a claim file, released on drop.
#[derive(Debug)]
struct ClaimLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
}

impl ClaimLock {
    /// `Ok(None)` when a live pipeline holds the claim.
    fn try_acquire(path: &Path) -> Result<Option<Self>, WorkspaceError> {
        let file = match OpenOptions::new().create(true).truncate(false).write(true).open(path) {
            Ok(file) => file,
            // The holder removed the area between our mkdir and open.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path)(e)),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            use std::os::unix::io::AsRawFd;
            loop {
                let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
                if result == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                match err.kind() {
                    std::io::ErrorKind::Interrupted => continue,
                    std::io::ErrorKind::WouldBlock => return Ok(None),
                    _ => return Err(io_err(path)(err)),
                }
            }

            // A lock on a claim file that was unlinked after we opened it
            // guards nothing.
            let held = file.metadata().map_err(io_err(path))?;
            match std::fs::metadata(path) {
                Ok(current) if current.dev() == held.dev() && current.ino() == held.ino() => {}
                _ => return Ok(None),
            }
        }

        Ok(Some(Self { file }))
    }
}

impl Drop for ClaimLock {
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

/// Claimed working areas for one snapshot.
#[derive(Debug)]
pub struct DateWorkspace {
    date: String,
    scratch: PathBuf,
    output: PathBuf,
    staged_file: PathBuf,
    _claim: ClaimLock,
}

impl DateWorkspace {
    /// Claim the date, copy the raw snapshot into the scratch area and
    /// create an empty output area. Leftovers from a dead pipeline are
    /// removed first.
    pub fn stage(scratch_root: &Path, output_root: &Path, file: &SnapshotFile) -> Result<Self, WorkspaceError> {
        let date = file.date();
        let scratch = scratch_root.join(&date);
        std::fs::create_dir_all(&scratch).map_err(io_err(&scratch))?;

        let Some(claim) = ClaimLock::try_acquire(&scratch.join(CLAIM_FILE))? else {
            return Err(WorkspaceError::Busy { date, path: scratch });
        };

        let output = output_root.join(&date);
        let workspace = Self {
            staged_file: scratch.join(file.file_name()),
            date,
            scratch,
            output,
            _claim: claim,
        };

        if let Err(e) = workspace.populate(file) {
            if let Err(cleanup) = workspace.cleanup() {
                warn!(
                    target: event_names::CLEANUP_FAILED,
                    date = %workspace.date,
                    error = %cleanup,
                    "Failed to release working areas after staging error"
                );
            }
            return Err(e);
        }
        Ok(workspace)
    }

    fn populate(&self, file: &SnapshotFile) -> Result<(), WorkspaceError> {
        let stale = self.clear_stale_scratch()?;
        let stale_output = self.output.exists();
        if stale > 0 || stale_output {
            warn!(
                target: event_names::WORKSPACE_RECLAIMED,
                date = %self.date,
                scratch_entries = stale,
                output = stale_output,
                "Reclaiming working areas left by an earlier pipeline"
            );
        }

        std::fs::copy(file.path(), &self.staged_file).map_err(io_err(file.path()))?;

        if stale_output {
            std::fs::remove_dir_all(&self.output).map_err(io_err(&self.output))?;
        }
        std::fs::create_dir_all(&self.output).map_err(io_err(&self.output))?;
        Ok(())
    }

    /// Remove everything in the scratch area except the claim file.
    fn clear_stale_scratch(&self) -> Result<usize, WorkspaceError> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.scratch).map_err(io_err(&self.scratch))? {
            let entry = entry.map_err(io_err(&self.scratch))?;
            if entry.file_name() == CLAIM_FILE {
                continue;
            }
            let path = entry.path();
            let is_dir = entry.file_type().map_err(io_err(&path))?.is_dir();
            let result = if is_dir {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(io_err(&path))?;
            debug!(path = %path.display(), "Removed stale scratch entry");
            removed += 1;
        }
        Ok(removed)
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The copy of the raw snapshot inside the scratch area.
    pub fn staged_file(&self) -> &Path {
        &self.staged_file
    }

    /// Delete every zero-byte file in the output area. Returns the count.
    pub fn remove_empty_outputs(&self) -> Result<usize, WorkspaceError> {
        let mut removed = 0;
        for path in self.list_output()? {
            let meta = std::fs::metadata(&path).map_err(io_err(&path))?;
            if meta.is_file() && meta.len() == 0 {
                std::fs::remove_file(&path).map_err(io_err(&path))?;
                debug!(path = %path.display(), "Removed empty converter output");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Output files with the given extension, sorted by name.
    pub fn output_files(&self, extension: &str) -> Result<Vec<PathBuf>, WorkspaceError> {
        Ok(self
            .list_output()?
            .into_iter()
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect())
    }

    fn list_output(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.output).map_err(io_err(&self.output))? {
            let entry = entry.map_err(io_err(&self.output))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    /// Remove both areas. Missing directories are not an error. The scratch
    /// area goes last since it carries the claim file.
    pub fn cleanup(&self) -> Result<(), WorkspaceError> {
        for dir in [&self.output, &self.scratch] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(dir)(e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw_snapshot(tmp: &TempDir) -> SnapshotFile {
        let path = tmp.path().join("sdb").join("19031514.sdb.gz");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"raw").unwrap();
        SnapshotFile::from_path(path).unwrap()
    }

    #[test]
    fn stage_copies_and_creates_areas() {
        let tmp = TempDir::new().unwrap();
        let file = raw_snapshot(&tmp);
        let ws = DateWorkspace::stage(&tmp.path().join("scratch"), &tmp.path().join("output"), &file).unwrap();

        assert_eq!(ws.date(), "19031514");
        assert_eq!(std::fs::read(ws.staged_file()).unwrap(), b"raw");
        assert!(ws.output().is_dir());
        assert_eq!(ws.scratch(), tmp.path().join("scratch").join("19031514"));
    }

    #[test]
    fn second_stage_is_busy() {
        let tmp = TempDir::new().unwrap();
        let file = raw_snapshot(&tmp);
        let scratch = tmp.path().join("scratch");
        let output = tmp.path().join("output");

        let first = DateWorkspace::stage(&scratch, &output, &file).unwrap();
        let err = DateWorkspace::stage(&scratch, &output, &file).unwrap_err();
        assert!(matches!(err, WorkspaceError::Busy { ref date, .. } if date == "19031514"));

        // The busy attempt must not disturb the first claim.
        assert!(first.staged_file().exists());
    }

    #[test]
    fn empty_outputs_removed_and_csv_listed() {
        let tmp = TempDir::new().unwrap();
        let file = raw_snapshot(&tmp);
        let ws = DateWorkspace::stage(&tmp.path().join("scratch"), &tmp.path().join("output"), &file).unwrap();

        std::fs::write(ws.output().join("b_12.csv"), b"1,2\n").unwrap();
        std::fs::write(ws.output().join("a_3.csv"), b"1,2\n").unwrap();
        std::fs::write(ws.output().join("empty_4.csv"), b"").unwrap();
        std::fs::write(ws.output().join("notes.txt"), b"x").unwrap();

        assert_eq!(ws.remove_empty_outputs().unwrap(), 1);
        let names: Vec<String> = ws
            .output_files("csv")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_3.csv", "b_12.csv"]);
    }

    #[test]
    fn cleanup_releases_claim() {
        let tmp = TempDir::new().unwrap();
        let file = raw_snapshot(&tmp);
        let scratch = tmp.path().join("scratch");
        let output = tmp.path().join("output");

        let ws = DateWorkspace::stage(&scratch, &output, &file).unwrap();
        ws.cleanup().unwrap();
        assert!(!ws.scratch().exists());
        assert!(!ws.output().exists());
        ws.cleanup().unwrap();

        DateWorkspace::stage(&scratch, &output, &file).unwrap();
    }

    #[test]
    fn unheld_area_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let file = raw_snapshot(&tmp);
        let scratch = tmp.path().join("scratch");
        let output = tmp.path().join("output");

        // Left behind by a pipeline that died mid-import.
        let stale = scratch.join("19031514");
        std::fs::create_dir_all(stale.join("partial")).unwrap();
        std::fs::write(stale.join(CLAIM_FILE), b"").unwrap();
        std::fs::write(stale.join("19031514.sdb.gz"), b"old").unwrap();
        std::fs::write(stale.join("partial").join("x"), b"x").unwrap();
        std::fs::create_dir_all(output.join("19031514")).unwrap();
        std::fs::write(output.join("19031514").join("old_3.csv"), b"1,2\n").unwrap();

        let ws = DateWorkspace::stage(&scratch, &output, &file).unwrap();
        assert_eq!(std::fs::read(ws.staged_file()).unwrap(), b"raw");
        assert!(!stale.join("partial").exists());
        assert!(ws.output_files("csv").unwrap().is_empty());
    }

    #[test]
    fn dropping_workspace_releases_claim() {
        let tmp = TempDir::new().unwrap();
        let file = raw_snapshot(&tmp);
        let scratch = tmp.path().join("scratch");
        let output = tmp.path().join("output");

        let first = DateWorkspace::stage(&scratch, &output, &file).unwrap();
        drop(first);

        let second = DateWorkspace::stage(&scratch, &output, &file).unwrap();
        assert!(second.staged_file().exists());
    }

    #[test]
    fn failed_copy_releases_claim() {
        let tmp = TempDir::new().unwrap();
        let file = SnapshotFile::from_path(tmp.path().join("19031514.sdb.gz")).unwrap();
        let scratch = tmp.path().join("scratch");

        let err = DateWorkspace::stage(&scratch, &tmp.path().join("output"), &file).unwrap_err();
        assert!(matches!(err, WorkspaceError::Io { .. }));
        assert!(!scratch.join("19031514").exists());
    }
}

//! In-process fakes and a filesystem fixture for pipeline tests.
//!
//! The fakes stand in for the external converter and the store so the
//! orchestrator can run end-to-end against real directories, a real ledger
//! and real diagnostic bundles.

#![allow(dead_code)]
// Test support provides more helpers than any single test uses.

use sdb_core::converter::{ConversionJob, Converter, ConverterError};
use sdb_core::ledger::ImportLedger;
use sdb_core::pipeline::{Importer, PipelineSettings};
use sdb_core::store::{StoreError, StoreWriter, VerifyWindow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Writes canned CSV files into the output area.
#[derive(Debug, Default)]
pub struct FakeConverter {
    outputs: Vec<(String, String)>,
    fail_with: Option<String>,
    pub jobs: Mutex<Vec<String>>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `name` with `content` on every conversion.
    pub fn with_output(mut self, name: &str, content: &str) -> Self {
        self.outputs.push((name.to_string(), content.to_string()));
        self
    }

    /// Fail every conversion with `status`.
    pub fn failing(status: &str) -> Self {
        Self {
            fail_with: Some(status.to_string()),
            ..Self::default()
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

impl Converter for FakeConverter {
    fn convert(&self, job: &ConversionJob<'_>) -> Result<(), ConverterError> {
        let window = job.file.token().window();
        let line = format!(
            "{} {} {} {} {}",
            window.year, window.month, window.day, window.hour, window.hour_end
        );
        self.jobs.lock().unwrap().push(job.file.date());
        fs::write(job.log, format!("$ fake-convert {line}\n")).unwrap();

        if let Some(status) = &self.fail_with {
            return Err(ConverterError::Failed {
                command: format!("fake-convert {line}"),
                status: status.clone(),
            });
        }
        for (name, content) in &self.outputs {
            fs::write(job.output.join(name), content).unwrap();
        }
        Ok(())
    }
}

/// Records submitted batches and answers count queries with a fixed value.
#[derive(Debug)]
pub struct FakeStore {
    count: u64,
    reject: bool,
    pub batches: Mutex<Vec<(String, String)>>,
    pub queries: Mutex<Vec<VerifyWindow>>,
}

impl FakeStore {
    /// A store whose count query returns `count`.
    pub fn with_count(count: u64) -> Self {
        Self {
            count,
            reject: false,
            batches: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::with_count(0)
        }
    }

    /// Contents of every batch written so far, in submission order.
    pub fn written(&self) -> Vec<(String, String)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn query_windows(&self) -> Vec<VerifyWindow> {
        self.queries.lock().unwrap().clone()
    }
}

impl StoreWriter for FakeStore {
    fn write(&self, batch: &Path, _date: &str, _log: &Path) -> Result<(), StoreError> {
        if self.reject {
            return Err(StoreError::ImportFailed {
                command: format!("fake-import {}", batch.display()),
                status: "exit status 1".to_string(),
            });
        }
        let name = batch.file_name().unwrap().to_string_lossy().into_owned();
        let content = fs::read_to_string(batch).unwrap();
        self.batches.lock().unwrap().push((name, content));
        Ok(())
    }

    fn count(&self, window: &VerifyWindow) -> Result<u64, StoreError> {
        self.queries.lock().unwrap().push(window.clone());
        Ok(self.count)
    }
}

/// Temporary deployment layout.
pub struct Fixture {
    pub tmp: TempDir,
    pub sdb_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub dictionary_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let fixture = Self {
            sdb_dir: root.join("sdb"),
            scratch_dir: root.join("scratch"),
            output_dir: root.join("output"),
            log_dir: root.join("log"),
            dictionary_dir: root.join("datums"),
            ledger_path: root.join("log/imported.txt"),
            tmp,
        };
        for dir in [&fixture.sdb_dir, &fixture.log_dir, &fixture.dictionary_dir] {
            fs::create_dir_all(dir).unwrap();
        }
        fixture
    }

    /// Settings pointing at the fixture, with no settle delay.
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            scratch_dir: self.scratch_dir.clone(),
            output_dir: self.output_dir.clone(),
            log_dir: self.log_dir.clone(),
            dictionary_dir: self.dictionary_dir.clone(),
            settle_delay: Duration::ZERO,
            guard_band: Duration::from_secs(30),
            max_parallel: 1,
            min_year: None,
            measurement: "sdbfull".to_string(),
            database: "sdbfull".to_string(),
        }
    }

    pub fn ledger(&self) -> ImportLedger {
        ImportLedger::new(&self.ledger_path)
    }

    pub fn importer<C: Converter, S: StoreWriter>(&self, converter: C, store: S) -> Importer<C, S> {
        Importer::new(self.settings(), self.ledger(), converter, store, "run-test")
    }

    /// Create a raw snapshot under the snapshot root and return its path.
    pub fn snapshot(&self, relative: &str) -> PathBuf {
        let path = self.sdb_dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"raw snapshot bytes").unwrap();
        path
    }

    /// Write `datums{id}.lst` with one `index,source,datum` row per pair.
    pub fn dictionary(&self, id: &str, columns: &[(&str, &str)]) {
        let body: String = columns
            .iter()
            .enumerate()
            .map(|(i, (source, datum))| format!("{},{},{}\n", i + 1, source, datum))
            .collect();
        fs::write(self.dictionary_dir.join(format!("datums{id}.lst")), body).unwrap();
    }

    pub fn ledger_text(&self) -> String {
        fs::read_to_string(&self.ledger_path).unwrap_or_default()
    }
}

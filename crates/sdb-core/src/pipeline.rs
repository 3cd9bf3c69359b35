//! Import orchestration.
//!
//! One snapshot moves through
//!
//! ```text
//! Discovered → Staged → Converted → Parsed → Encoded → Written → Verified → Committed
//! ```
//!
//! or drops to `Failed` from any non-terminal state. Every transition is
//! logged and kept in a [`TransitionTrail`] that ends up in the diagnostic
//! bundle when something goes wrong. The ledger is only touched after the
//! store confirms the hour holds data.

use chrono::{DateTime, Utc};
use sdb_bundle::BundleWriter;
use sdb_common::{SnapshotFile, SCHEMA_VERSION};
use sdb_config::ImportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Span};

use crate::catalog;
use crate::converter::{ConversionJob, Converter};
use crate::dictionary::{file_type_id, DictionaryCache, DictionaryError};
use crate::encode::{encode, parse_csv_file};
use crate::error::{ErrorSummary, ImportError};
use crate::exit_codes::ExitCode;
use crate::ledger::{CommitResult, ImportLedger, LedgerError};
use crate::logging::event_names;
use crate::store::{StoreWriter, VerifyWindow};
use crate::workspace::DateWorkspace;

/// Granularity of the shutdown check while settling.
const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Where one snapshot is in the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Discovered,
    Staged,
    Converted,
    Parsed,
    Encoded,
    Written,
    Verified,
    Committed,
    Failed,
}

impl PipelineState {
    /// The state a successful step leads to.
    pub fn next(self) -> Option<Self> {
        use PipelineState::*;
        match self {
            Discovered => Some(Staged),
            Staged => Some(Converted),
            Converted => Some(Parsed),
            Parsed => Some(Encoded),
            Encoded => Some(Written),
            Written => Some(Verified),
            Verified => Some(Committed),
            Committed | Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Committed | PipelineState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Discovered => "discovered",
            PipelineState::Staged => "staged",
            PipelineState::Converted => "converted",
            PipelineState::Parsed => "parsed",
            PipelineState::Encoded => "encoded",
            PipelineState::Written => "written",
            PipelineState::Verified => "verified",
            PipelineState::Committed => "committed",
            PipelineState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Per-file history of state changes.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionTrail {
    date: String,
    state: PipelineState,
    transitions: Vec<Transition>,
}

impl TransitionTrail {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            state: PipelineState::Discovered,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Move to the next state. Returns the new state; terminal trails do
    /// not move.
    pub fn advance(&mut self, note: Option<String>) -> PipelineState {
        match self.state.next() {
            Some(to) => self.record(to, note),
            None => {
                warn!(date = %self.date, state = %self.state, "Ignoring advance of finished pipeline");
            }
        }
        self.state
    }

    /// Drop to `Failed`. Returns the step that was being attempted.
    pub fn fail(&mut self, reason: &str) -> PipelineState {
        let attempted = self.state.next().unwrap_or(self.state);
        if !self.state.is_terminal() {
            self.record(PipelineState::Failed, Some(reason.to_string()));
        }
        attempted
    }

    fn record(&mut self, to: PipelineState, note: Option<String>) {
        let from = self.state;
        info!(
            target: event_names::PIPELINE_TRANSITION,
            date = %self.date,
            from = %from,
            to = %to,
            note = note.as_deref().unwrap_or(""),
            "Pipeline transition"
        );
        Span::current().record("stage", to.as_str());
        self.transitions.push(Transition {
            from,
            to,
            at: Utc::now(),
            note,
        });
        self.state = to;
    }
}

/// How one snapshot import ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Committed,
    AlreadyImported,
    /// Another pipeline holds the date.
    Busy,
    Failed {
        /// The step that was being attempted.
        stage: PipelineState,
        error: ErrorSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bundle: Option<PathBuf>,
    },
}

impl ImportOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ImportOutcome::Failed { .. })
    }
}

/// Result for one file within a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub date: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: ImportOutcome,
    /// Measurement lines submitted to the store.
    pub lines: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<Transition>,
}

/// Summary of one catalog pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub schema_version: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub pending: usize,
    pub committed: usize,
    pub already_imported: usize,
    pub busy: usize,
    pub failed: usize,
    /// The shutdown flag stopped the pass before every pending file ran.
    pub interrupted: bool,
    pub files: Vec<FileResult>,
}

impl PassReport {
    fn new(run_id: &str) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            started_at: now,
            finished_at: now,
            discovered: 0,
            pending: 0,
            committed: 0,
            already_imported: 0,
            busy: 0,
            failed: 0,
            interrupted: false,
            files: Vec::new(),
        }
    }

    fn push(&mut self, result: FileResult) {
        match result.outcome {
            ImportOutcome::Committed => self.committed += 1,
            ImportOutcome::AlreadyImported => self.already_imported += 1,
            ImportOutcome::Busy => self.busy += 1,
            ImportOutcome::Failed { .. } => self.failed += 1,
        }
        self.files.push(result);
    }

    /// CLI exit code for this pass.
    pub fn exit_code(&self) -> ExitCode {
        if self.failed > 0 {
            ExitCode::PartialFail
        } else if self.committed > 0 {
            ExitCode::Imported
        } else {
            ExitCode::Clean
        }
    }
}

/// Filesystem layout and tuning for an [`Importer`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub dictionary_dir: PathBuf,
    pub settle_delay: Duration,
    pub guard_band: Duration,
    pub max_parallel: usize,
    pub min_year: Option<u8>,
    pub measurement: String,
    pub database: String,
}

impl PipelineSettings {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            scratch_dir: config.paths.scratch_dir.clone(),
            output_dir: config.paths.output_dir.clone(),
            log_dir: config.paths.log_dir.clone(),
            dictionary_dir: config.paths.dictionary_dir.clone(),
            settle_delay: config.pipeline.settle_delay(),
            guard_band: config.pipeline.guard_band(),
            max_parallel: config.pipeline.max_parallel.max(1),
            min_year: config.pipeline.min_year,
            measurement: config.pipeline.measurement.clone(),
            database: config.store.database.clone(),
        }
    }

    /// `{log_dir}/{date}Std.log`
    pub fn conversion_log(&self, date: &str) -> PathBuf {
        self.log_dir.join(format!("{date}Std.log"))
    }

    /// `{log_dir}/{date}_error.zip`
    pub fn bundle_path(&self, date: &str) -> PathBuf {
        self.log_dir.join(format!("{date}_error.zip"))
    }
}

/// Contents of `failure.json` inside a diagnostic bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub run_id: String,
    pub date: String,
    pub snapshot: PathBuf,
    pub failed_stage: PipelineState,
    pub error: ErrorSummary,
    pub failed_at: DateTime<Utc>,
}

/// Drives snapshots through the pipeline.
pub struct Importer<C, S> {
    settings: PipelineSettings,
    ledger: ImportLedger,
    converter: C,
    store: S,
    run_id: String,
    shutdown: Arc<AtomicBool>,
}

impl<C: Converter, S: StoreWriter> Importer<C, S> {
    pub fn new(settings: PipelineSettings, ledger: ImportLedger, converter: C, store: S, run_id: impl Into<String>) -> Self {
        Self {
            settings,
            ledger,
            converter,
            store,
            run_id: run_id.into(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned shutdown flag (e.g. set by a signal handler).
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &ImportLedger {
        &self.ledger
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Handle to request a stop; in-flight files finish.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Discover, filter and import everything pending under `root`.
    pub fn run_pass(&self, root: &Path) -> Result<PassReport, LedgerError> {
        let mut report = PassReport::new(&self.run_id);
        info!(target: event_names::PASS_STARTED, run_id = %self.run_id, root = %root.display(), "Starting import pass");

        let pending = self.pending(root, &mut report)?;
        let noticed = Instant::now();
        self.process(pending, noticed, &mut report);

        report.finished_at = Utc::now();
        info!(
            target: event_names::PASS_FINISHED,
            run_id = %self.run_id,
            committed = report.committed,
            failed = report.failed,
            busy = report.busy,
            already_imported = report.already_imported,
            interrupted = report.interrupted,
            "Import pass finished"
        );
        Ok(report)
    }

    /// Pending files under `root` in processing order.
    pub fn pending_files(&self, root: &Path) -> Result<Vec<SnapshotFile>, LedgerError> {
        let mut scratch = PassReport::new(&self.run_id);
        self.pending(root, &mut scratch)
    }

    fn pending(&self, root: &Path, report: &mut PassReport) -> Result<Vec<SnapshotFile>, LedgerError> {
        let mut files = catalog::discover(root);
        report.discovered = files.len();
        if let Some(min_year) = self.settings.min_year {
            files = catalog::prune(files, min_year);
        }
        let pending = catalog::sort_by_recency(catalog::pending(files, &self.ledger)?);
        report.pending = pending.len();

        info!(
            target: event_names::CATALOG_SCANNED,
            discovered = report.discovered,
            pending = report.pending,
            "Catalog scanned"
        );
        Ok(pending)
    }

    /// Import explicit files. The ledger is still honoured.
    pub fn import_files(&self, files: Vec<SnapshotFile>) -> PassReport {
        let mut report = PassReport::new(&self.run_id);
        report.discovered = files.len();
        report.pending = files.len();
        self.process(files, Instant::now(), &mut report);
        report.finished_at = Utc::now();
        report
    }

    fn process(&self, files: Vec<SnapshotFile>, noticed: Instant, report: &mut PassReport) {
        if files.is_empty() {
            return;
        }
        if !self.settle(noticed) {
            report.interrupted = true;
            info!(target: event_names::PASS_INTERRUPTED, remaining = files.len(), "Shutdown requested while settling");
            return;
        }

        let chunk_size = self.settings.max_parallel.max(1);

        for chunk in files.chunks(chunk_size) {
            if self.stopping() {
                report.interrupted = true;
                info!(target: event_names::PASS_INTERRUPTED, remaining = files.len() - report.files.len(), "Shutdown requested; not starting new files");
                break;
            }

            if chunk.len() == 1 {
                report.push(self.import_one(&chunk[0]));
                continue;
            }

            let results: Vec<FileResult> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|file| scope.spawn(move || self.import_one(file)))
                    .collect();
                handles
                    .into_iter()
                    .zip(chunk)
                    .map(|(handle, file)| {
                        handle.join().unwrap_or_else(|_| {
                            error!(target: event_names::INTERNAL_ERROR, date = %file.date(), "Import thread panicked");
                            panicked_result(file)
                        })
                    })
                    .collect()
            });
            for result in results {
                report.push(result);
            }
        }
    }

    /// Wait until `settle_delay` has passed since the files were noticed.
    /// Returns false if shutdown was requested meanwhile.
    fn settle(&self, noticed: Instant) -> bool {
        let remaining = self.settings.settle_delay.saturating_sub(noticed.elapsed());
        if remaining.is_zero() {
            return !self.stopping();
        }
        debug!(target: event_names::PIPELINE_SETTLING, wait_ms = remaining.as_millis() as u64, "Waiting for snapshots to settle");

        let deadline = Instant::now() + remaining;
        loop {
            if self.stopping() {
                return false;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return true;
            }
            std::thread::sleep(left.min(SETTLE_POLL));
        }
    }

    /// Run one snapshot through the pipeline.
    pub fn import_one(&self, file: &SnapshotFile) -> FileResult {
        let date = file.date();
        let span = tracing::info_span!("import", run_id = %self.run_id, date = %date, stage = tracing::field::Empty);
        let _guard = span.enter();

        let start = Instant::now();
        let mut trail = TransitionTrail::new(&date);
        let mut lines = 0;
        let outcome = self.drive(file, &mut trail, &mut lines);

        FileResult {
            date,
            path: file.path().to_path_buf(),
            outcome,
            lines,
            duration_ms: start.elapsed().as_millis() as u64,
            transitions: trail.transitions,
        }
    }

    fn drive(&self, file: &SnapshotFile, trail: &mut TransitionTrail, lines: &mut usize) -> ImportOutcome {
        match self.already_imported(file) {
            Ok(true) => {
                debug!(target: event_names::PIPELINE_ALREADY_IMPORTED, "Snapshot already in ledger");
                return ImportOutcome::AlreadyImported;
            }
            Ok(false) => {}
            Err(e) => return self.fail(file, trail, None, e.into()),
        }

        let workspace = match DateWorkspace::stage(&self.settings.scratch_dir, &self.settings.output_dir, file) {
            Ok(ws) => ws,
            Err(e) => {
                let err = ImportError::from(e);
                if err.is_busy() {
                    info!(target: event_names::PIPELINE_BUSY, error = %err, "Date is busy; skipping");
                    return ImportOutcome::Busy;
                }
                return self.fail(file, trail, None, err);
            }
        };
        trail.advance(Some(format!("staged {}", workspace.staged_file().display())));

        match self.run_steps(file, &workspace, trail, lines) {
            Ok(()) => {
                info!(target: event_names::PIPELINE_COMMITTED, lines = *lines, "Snapshot imported");
                self.cleanup(&workspace);
                ImportOutcome::Committed
            }
            Err(e) => self.fail(file, trail, Some(&workspace), e),
        }
    }

    fn already_imported(&self, file: &SnapshotFile) -> Result<bool, LedgerError> {
        self.ledger.seen(file)
    }

    fn run_steps(
        &self,
        file: &SnapshotFile,
        workspace: &DateWorkspace,
        trail: &mut TransitionTrail,
        lines: &mut usize,
    ) -> Result<(), ImportError> {
        let date = workspace.date();
        let log = self.settings.conversion_log(date);

        self.converter.convert(&ConversionJob {
            file,
            staged: workspace.staged_file(),
            output: workspace.output(),
            log: &log,
        })?;
        trail.advance(None);

        let removed = workspace.remove_empty_outputs()?;
        let mut cache = DictionaryCache::new(&self.settings.dictionary_dir);
        let mut parsed = Vec::new();
        let mut skipped = 0;
        for csv in workspace.output_files("csv")? {
            let name = csv.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let Some(id) = file_type_id(name) else {
                warn!(file = %csv.display(), "Converter output has no file type id; skipping");
                skipped += 1;
                continue;
            };
            let dictionary = match cache.get(&id) {
                Ok(dictionary) => dictionary,
                Err(e @ DictionaryError::NotFound { .. }) => {
                    warn!(target: event_names::DICTIONARY_MISSING, file = %csv.display(), error = %e, "Skipping file type");
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let rows = parse_csv_file(&csv, dictionary.len())?;
            parsed.push((id, dictionary, rows));
        }
        trail.advance(Some(format!(
            "{} file(s) parsed, {} skipped, {} empty removed",
            parsed.len(),
            skipped,
            removed
        )));

        let mut batches = Vec::new();
        for (id, dictionary, rows) in &parsed {
            let batch = encode(rows, dictionary, &self.settings.measurement);
            if batch.is_empty() {
                debug!(file_type = %id, "No measurements for file type");
                continue;
            }
            let path = workspace.output().join(format!("{id}.flx"));
            batch.write_to(&path, &self.settings.database)?;
            *lines += batch.len();
            batches.push(path);
        }
        batches.sort();
        trail.advance(Some(format!("{} batch(es), {} line(s)", batches.len(), *lines)));

        for batch in &batches {
            self.store.write(batch, date, &log).map_err(ImportError::Write)?;
            info!(target: event_names::STORE_WRITTEN, batch = %batch.display(), "Batch loaded");
        }
        trail.advance(None);

        let window = VerifyWindow::for_token(file.token(), self.settings.guard_band).map_err(ImportError::Query)?;
        let count = self.store.count(&window).map_err(ImportError::Query)?;
        info!(target: event_names::VERIFY_RESULT, count, window = %window, "Verification query");
        if count == 0 {
            return Err(ImportError::VerificationMismatch { window });
        }
        trail.advance(Some(format!("count {count}")));

        match self.ledger.commit(file)? {
            CommitResult::Appended => trail.advance(None),
            CommitResult::AlreadyPresent => trail.advance(Some("already in ledger".to_string())),
        };
        Ok(())
    }

    fn fail(
        &self,
        file: &SnapshotFile,
        trail: &mut TransitionTrail,
        workspace: Option<&DateWorkspace>,
        err: ImportError,
    ) -> ImportOutcome {
        let summary = err.summary();
        let stage = trail.fail(&summary.message);
        error!(
            target: event_names::PIPELINE_FAILED,
            stage = %stage,
            code = summary.code,
            error = %summary.message,
            "Import failed"
        );

        let report = FailureReport {
            run_id: self.run_id.clone(),
            date: file.date(),
            snapshot: file.path().to_path_buf(),
            failed_stage: stage,
            error: summary.clone(),
            failed_at: Utc::now(),
        };

        let bundle = match self.write_bundle(&report, trail, workspace) {
            Ok(path) => {
                info!(target: event_names::BUNDLE_WRITTEN, path = %path.display(), "Diagnostic bundle written");
                if let Some(ws) = workspace {
                    self.cleanup(ws);
                }
                Some(path)
            }
            Err(e) => {
                error!(
                    target: event_names::BUNDLE_FAILED,
                    error = %e,
                    "Failed to write diagnostic bundle; leaving working areas in place"
                );
                None
            }
        };

        ImportOutcome::Failed {
            stage,
            error: summary,
            bundle,
        }
    }

    fn write_bundle(
        &self,
        report: &FailureReport,
        trail: &TransitionTrail,
        workspace: Option<&DateWorkspace>,
    ) -> Result<PathBuf, ImportError> {
        std::fs::create_dir_all(&self.settings.log_dir)?;

        let mut bundle = BundleWriter::new(&self.run_id, &report.date)
            .with_failed_stage(report.failed_stage.as_str())
            .with_importer_version(env!("CARGO_PKG_VERSION"))
            .with_description(&report.error.message);
        bundle.add_json("failure.json", report)?;
        bundle.add_json("transitions.json", &trail.transitions)?;

        let log = self.settings.conversion_log(&report.date);
        bundle.add_path(format!("logs/{}", file_name(&log)), &log)?;
        if let Some(ws) = workspace {
            bundle.add_dir("scratch", ws.scratch())?;
            bundle.add_dir("output", ws.output())?;
        }

        let path = self.settings.bundle_path(&report.date);
        bundle.write(&path)?;
        Ok(path)
    }

    fn cleanup(&self, workspace: &DateWorkspace) {
        if let Err(e) = workspace.cleanup() {
            warn!(target: event_names::CLEANUP_FAILED, error = %e, "Failed to remove working areas");
        }
    }

    /// Backfill the ledger for pending files whose hour already has data.
    ///
    /// Only the verification query runs; nothing is converted or written.
    pub fn reconcile(&self, root: &Path) -> Result<ReconcileReport, ImportError> {
        let mut report = ReconcileReport::default();
        for file in self.pending_files(root)? {
            if self.stopping() {
                break;
            }
            report.checked += 1;

            let window = VerifyWindow::for_token(file.token(), self.settings.guard_band).map_err(ImportError::Query)?;
            let count = match self.store.count(&window) {
                Ok(count) => count,
                Err(e) => {
                    warn!(date = %file.date(), error = %e, "Verification query failed");
                    report.errors.push(file.date());
                    continue;
                }
            };

            if count > 0 {
                self.ledger.commit(&file)?;
                info!(target: event_names::RECONCILE_COMMITTED, date = %file.date(), count, "Recorded existing data in ledger");
                report.committed.push(file.date());
            } else {
                report.missing.push(file.date());
            }
        }
        Ok(report)
    }
}

/// Result of [`Importer::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub checked: usize,
    /// Dates whose data was found and are now in the ledger.
    pub committed: Vec<String>,
    /// Dates with no data in the store.
    pub missing: Vec<String>,
    /// Dates whose query failed.
    pub errors: Vec<String>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn panicked_result(file: &SnapshotFile) -> FileResult {
    FileResult {
        date: file.date(),
        path: file.path().to_path_buf(),
        outcome: ImportOutcome::Failed {
            stage: PipelineState::Discovered,
            error: ErrorSummary {
                code: 20,
                category: sdb_common::ErrorCategory::Io,
                message: "import thread panicked".to_string(),
                suggested_action: sdb_common::SuggestedAction::ManualIntervention,
            },
            bundle: None,
        },
        lines: 0,
        duration_ms: 0,
        transitions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_in_order() {
        let mut state = PipelineState::Discovered;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(
            seen.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            vec!["discovered", "staged", "converted", "parsed", "encoded", "written", "verified", "committed"]
        );
        assert!(PipelineState::Failed.next().is_none());
        assert!(PipelineState::Committed.is_terminal());
    }

    #[test]
    fn trail_records_failure_with_attempted_step() {
        let mut trail = TransitionTrail::new("19031514");
        trail.advance(None);
        assert_eq!(trail.state(), PipelineState::Staged);

        let attempted = trail.fail("converter exited 1");
        assert_eq!(attempted, PipelineState::Converted);
        assert_eq!(trail.state(), PipelineState::Failed);
        assert_eq!(trail.transitions().len(), 2);
        assert_eq!(trail.transitions()[1].note.as_deref(), Some("converter exited 1"));

        // Terminal trails stay put.
        trail.advance(None);
        trail.fail("again");
        assert_eq!(trail.transitions().len(), 2);
    }

    #[test]
    fn outcome_serialization_is_tagged() {
        let json = serde_json::to_value(ImportOutcome::Busy).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "busy"}));
    }

    #[test]
    fn pass_exit_codes() {
        let mut report = PassReport::new("run-test");
        assert_eq!(report.exit_code(), ExitCode::Clean);

        report.committed = 2;
        assert_eq!(report.exit_code(), ExitCode::Imported);

        report.failed = 1;
        assert_eq!(report.exit_code(), ExitCode::PartialFail);
    }

    #[test]
    fn settings_paths() {
        let settings = PipelineSettings::from_config(&ImportConfig::default());
        assert_eq!(settings.conversion_log("19031514"), PathBuf::from("/sdb_puller/log/19031514Std.log"));
        assert_eq!(settings.bundle_path("19031514"), PathBuf::from("/sdb_puller/log/19031514_error.zip"));
        assert_eq!(settings.settle_delay, Duration::from_secs(30));
    }
}

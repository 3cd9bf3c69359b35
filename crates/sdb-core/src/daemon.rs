//! Polling import daemon.
//!
//! Each poll scans the snapshot root and either imports the most recently
//! created pending file (`latest`) or runs a full pass (`all`). The loop
//! checks the shutdown flag between polls and while sleeping, so a stop
//! request never interrupts a file mid-pipeline.

use chrono::Utc;
use sdb_config::{DaemonConfig, DaemonMode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::catalog;
use crate::converter::Converter;
use crate::logging::event_names;
use crate::pipeline::{ImportOutcome, Importer, PassReport};
use crate::store::StoreWriter;

const MAX_RECENT_EVENTS: usize = 100;
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Loop settings.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub poll_interval: Duration,
    pub mode: DaemonMode,
    /// Stop after this many polls.
    pub max_polls: Option<u64>,
}

impl DaemonOptions {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            mode: config.mode,
            max_polls: None,
        }
    }

    pub fn with_mode(mut self, mode: DaemonMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_polls(mut self, max_polls: Option<u64>) -> Self {
        self.max_polls = max_polls;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonEvent {
    pub timestamp: String,
    pub event_type: DaemonEventType,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonEventType {
    Started,
    Stopped,
    PollCompleted,
    Imported,
    ImportFailed,
    Busy,
    PollFailed,
}

/// Running state of the daemon loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonState {
    pub started_at: String,
    pub poll_count: u64,
    pub last_poll_at: Option<String>,
    pub import_count: u64,
    pub failure_count: u64,
    pub recent_events: VecDeque<DaemonEvent>,
}

impl Default for DaemonState {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now().to_rfc3339(),
            poll_count: 0,
            last_poll_at: None,
            import_count: 0,
            failure_count: 0,
            recent_events: VecDeque::with_capacity(MAX_RECENT_EVENTS),
        }
    }

    pub fn record_event(&mut self, event_type: DaemonEventType, detail: &str) {
        if self.recent_events.len() >= MAX_RECENT_EVENTS {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(DaemonEvent {
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            detail: detail.to_string(),
        });
    }

    fn absorb(&mut self, report: &PassReport) {
        for file in &report.files {
            match &file.outcome {
                ImportOutcome::Committed => {
                    self.import_count += 1;
                    self.record_event(DaemonEventType::Imported, &file.date);
                }
                ImportOutcome::Failed { error, .. } => {
                    self.failure_count += 1;
                    self.record_event(DaemonEventType::ImportFailed, &format!("{}: {}", file.date, error.message));
                }
                ImportOutcome::Busy => self.record_event(DaemonEventType::Busy, &file.date),
                ImportOutcome::AlreadyImported => {}
            }
        }
    }
}

/// Outcome of a single poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOutcome {
    pub poll_number: u64,
    /// `None` when the poll found nothing to do or could not read the ledger.
    pub report: Option<PassReport>,
}

/// Run one poll against `root`.
pub fn poll_once<C: Converter, S: StoreWriter>(
    importer: &Importer<C, S>,
    root: &Path,
    mode: DaemonMode,
    state: &mut DaemonState,
) -> PollOutcome {
    state.poll_count += 1;
    state.last_poll_at = Some(Utc::now().to_rfc3339());
    let poll_number = state.poll_count;

    let report = match mode {
        DaemonMode::All => importer.run_pass(root).map(Some),
        DaemonMode::Latest => latest(importer, root),
    };

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            warn!(target: event_names::DAEMON_POLL, poll = poll_number, error = %e, "Poll failed");
            state.record_event(DaemonEventType::PollFailed, &e.to_string());
            None
        }
    };

    if let Some(report) = &report {
        state.absorb(report);
    }
    info!(
        target: event_names::DAEMON_POLL,
        poll = poll_number,
        mode = %mode,
        files = report.as_ref().map(|r| r.files.len()).unwrap_or(0),
        "Poll completed"
    );
    state.record_event(DaemonEventType::PollCompleted, &format!("poll {poll_number}"));

    PollOutcome { poll_number, report }
}

fn latest<C: Converter, S: StoreWriter>(
    importer: &Importer<C, S>,
    root: &Path,
) -> Result<Option<PassReport>, crate::ledger::LedgerError> {
    let mut files = catalog::discover(root);
    if let Some(min_year) = importer.settings().min_year {
        files = catalog::prune(files, min_year);
    }
    let Some(newest) = catalog::most_recent(&files) else {
        return Ok(None);
    };
    if importer.ledger().seen(newest)? {
        return Ok(None);
    }
    Ok(Some(importer.import_files(vec![newest.clone()])))
}

/// Poll until shutdown is requested or `max_polls` is reached.
pub fn run_daemon<C: Converter, S: StoreWriter>(
    importer: &Importer<C, S>,
    root: &Path,
    options: &DaemonOptions,
) -> DaemonState {
    let shutdown = importer.shutdown_handle();
    let mut state = DaemonState::new();
    state.record_event(DaemonEventType::Started, &root.display().to_string());
    info!(
        target: event_names::RUN_STARTED,
        root = %root.display(),
        mode = %options.mode,
        interval_secs = options.poll_interval.as_secs(),
        "Daemon started"
    );

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        poll_once(importer, root, options.mode, &mut state);

        if options.max_polls.is_some_and(|max| state.poll_count >= max) {
            break;
        }

        let deadline = Instant::now() + options.poll_interval;
        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    state.record_event(DaemonEventType::Stopped, &format!("after {} poll(s)", state.poll_count));
    info!(
        target: event_names::DAEMON_STOPPED,
        polls = state.poll_count,
        imports = state.import_count,
        failures = state.failure_count,
        "Daemon stopped"
    );
    state
}

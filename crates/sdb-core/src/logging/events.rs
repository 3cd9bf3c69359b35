//! Event vocabulary for structured logging.
//!
//! Event names double as `tracing` targets, so JSONL consumers can filter on
//! the `event` key without parsing messages.

use serde::{Deserialize, Serialize};

/// Log levels as they appear in JSONL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Catalog passes
    pub const PASS_STARTED: &str = "pass.started";
    pub const PASS_FINISHED: &str = "pass.finished";
    pub const PASS_INTERRUPTED: &str = "pass.interrupted";
    pub const CATALOG_SCANNED: &str = "catalog.scanned";

    // Per-file pipeline
    pub const PIPELINE_TRANSITION: &str = "pipeline.transition";
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    pub const PIPELINE_BUSY: &str = "pipeline.busy";
    pub const PIPELINE_ALREADY_IMPORTED: &str = "pipeline.already_imported";
    pub const PIPELINE_COMMITTED: &str = "pipeline.committed";
    pub const PIPELINE_SETTLING: &str = "pipeline.settling";
    pub const WORKSPACE_RECLAIMED: &str = "workspace.reclaimed";

    // External steps
    pub const TOOL_STARTED: &str = "tool.started";
    pub const TOOL_FINISHED: &str = "tool.finished";
    pub const DICTIONARY_MISSING: &str = "dictionary.missing";
    pub const STORE_WRITTEN: &str = "store.written";
    pub const VERIFY_RESULT: &str = "verify.result";

    // Persistence
    pub const LEDGER_COMMITTED: &str = "ledger.committed";
    pub const BUNDLE_WRITTEN: &str = "bundle.written";
    pub const BUNDLE_FAILED: &str = "bundle.failed";
    pub const CLEANUP_FAILED: &str = "cleanup.failed";
    pub const RECONCILE_COMMITTED: &str = "reconcile.committed";

    // Daemon
    pub const DAEMON_POLL: &str = "daemon.poll";
    pub const DAEMON_STOPPED: &str = "daemon.stopped";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::WARN), Level::Warn);
        assert_eq!(serde_json::to_string(&Level::Info).unwrap(), "\"info\"");
    }

    #[test]
    fn event_names_are_dotted_lowercase() {
        for name in [
            event_names::PASS_STARTED,
            event_names::PIPELINE_TRANSITION,
            event_names::LEDGER_COMMITTED,
            event_names::BUNDLE_WRITTEN,
        ] {
            assert!(name.contains('.'));
            assert_eq!(name, name.to_lowercase());
        }
    }
}

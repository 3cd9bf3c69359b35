//! Structured logging foundation for sdb-core.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for daemon and cron workflows
//!
//! # Usage
//!
//! ```ignore
//! use sdb_core::logging::{event_names, generate_run_id, init_logging, LogConfig};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//!
//! let span = tracing::info_span!("run", run_id = %generate_run_id());
//! let _guard = span.enter();
//! tracing::info!(target: event_names::RUN_STARTED, "Starting import run");
//! ```
//!
//! # Design Notes
//!
//! - stdout is reserved for command payloads (JSON output)
//! - stderr receives all log output (human or JSONL)
//! - `run_id`, `date` and `stage` span fields are lifted into every JSONL line

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel, ENV_LOG_FORMAT, ENV_LOG_LEVEL};
pub use events::{event_names, Level};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the level filter.
///
/// Event names are used as targets, so the filter applies globally rather
/// than to the crate path. `RUST_LOG` directives apply only when no explicit
/// level was given.
fn build_filter(config: &LogConfig) -> EnvFilter {
    config
        .directives
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(config.level.to_string()))
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. A second call
/// is a no-op.
pub fn init_logging(config: &LogConfig) {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    // Shorten to first 12 hex chars for readability
    format!("run-{}", &uuid.simple().to_string()[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_short_and_unique() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), 16);
        assert!(a[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn explicit_level_beats_rust_log() {
        use tracing_subscriber::filter::LevelFilter;

        let env = |key: &str| (key == "RUST_LOG").then(|| "trace".to_string());

        let config = LogConfig::from_lookup(env, None, None);
        assert_eq!(build_filter(&config).max_level_hint(), Some(LevelFilter::TRACE));

        let config = LogConfig::from_lookup(env, Some(LogLevel::Warn), None);
        assert_eq!(build_filter(&config).max_level_hint(), Some(LevelFilter::WARN));

        let config = LogConfig::from_lookup(env, None, None).with_level(LogLevel::Error);
        assert_eq!(build_filter(&config).max_level_hint(), Some(LevelFilter::ERROR));
    }
}

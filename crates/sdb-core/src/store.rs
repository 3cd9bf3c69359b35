//! Time-series store access.
//!
//! Batches are bulk-loaded with the store's command-line importer and then
//! verified with a count query over the snapshot's hour, trimmed by a guard
//! band at each end so samples from neighbouring hours do not count.

use chrono::NaiveDateTime;
use sdb_common::DateToken;
use sdb_config::StoreConfig;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::tool_runner::{self, expand_placeholders, ToolError, ToolSpec};

const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("bulk load `{command}` failed: {status}")]
    ImportFailed { command: String, status: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("count query against {url} failed: {reason}")]
    Query { url: String, reason: String },

    #[error("{date} does not name a valid hour")]
    InvalidWindow { date: String },
}

/// Trimmed verification interval for one snapshot hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyWindow {
    pub date: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl VerifyWindow {
    /// `[hour + guard, hour + 1h - guard]` for the hour `token` names.
    pub fn for_token(token: DateToken, guard_band: Duration) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidWindow {
            date: token.to_string(),
        };
        let hour_start = token.hour_start().ok_or_else(invalid)?;
        let guard = chrono::Duration::from_std(guard_band).map_err(|_| invalid())?;

        Ok(Self {
            date: token.to_string(),
            start: hour_start + guard,
            end: hour_start + chrono::Duration::hours(1) - guard,
        })
    }

    pub fn start_text(&self) -> String {
        self.start.format(WINDOW_FORMAT).to_string()
    }

    pub fn end_text(&self) -> String {
        self.end.format(WINDOW_FORMAT).to_string()
    }
}

impl std::fmt::Display for VerifyWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} between {} and {}", self.date, self.start_text(), self.end_text())
    }
}

/// Destination for encoded batches.
pub trait StoreWriter: Send + Sync {
    /// Load one rendered batch file. Tool output goes to `log`.
    fn write(&self, batch: &Path, date: &str, log: &Path) -> Result<(), StoreError>;

    /// Largest per-series sample count inside `window`; 0 when nothing is
    /// stored.
    fn count(&self, window: &VerifyWindow) -> Result<u64, StoreError>;
}

/// InfluxDB 1.x through `influx -import` and the `/query` endpoint.
#[derive(Debug, Clone)]
pub struct InfluxStore {
    database: String,
    retention_policy: String,
    measurement: String,
    url: String,
    import_program: String,
    import_args: Vec<String>,
    import_timeout: Duration,
    query_timeout: Duration,
}

impl InfluxStore {
    pub fn from_config(config: &StoreConfig, measurement: impl Into<String>) -> Self {
        Self {
            database: config.database.clone(),
            retention_policy: config.retention_policy.clone(),
            measurement: measurement.into(),
            url: config.url.trim_end_matches('/').to_string(),
            import_program: config.import_program.clone(),
            import_args: config.import_args.clone(),
            import_timeout: config.import_timeout(),
            query_timeout: config.query_timeout(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// The verification statement for `window`.
    pub fn count_query(&self, window: &VerifyWindow) -> String {
        format!(
            "SELECT count(*) FROM \"{}\".\"{}\".\"{}\" WHERE time > '{}' AND time < '{}'",
            self.database,
            self.retention_policy,
            self.measurement,
            window.start_text(),
            window.end_text()
        )
    }

    pub fn import_spec(&self, batch: &Path, date: &str) -> ToolSpec {
        let file = batch.to_string_lossy();
        let vars = [("file", &*file), ("database", self.database.as_str()), ("date", date)];
        let args = self
            .import_args
            .iter()
            .map(|arg| expand_placeholders(arg, &vars))
            .collect();
        ToolSpec::new(self.import_program.clone(), args, self.import_timeout)
    }
}

impl StoreWriter for InfluxStore {
    fn write(&self, batch: &Path, date: &str, log: &Path) -> Result<(), StoreError> {
        let output = tool_runner::run(&self.import_spec(batch, date))?;
        if let Err(e) = output.append_to_log(log) {
            warn!(log = %log.display(), error = %e, "Failed to write import log");
        }

        if output.success() {
            Ok(())
        } else {
            Err(StoreError::ImportFailed {
                command: output.command_line.clone(),
                status: output.status_text(),
            })
        }
    }

    fn count(&self, window: &VerifyWindow) -> Result<u64, StoreError> {
        let query = self.count_query(window);
        let endpoint = format!("{}/query", self.url);
        debug!(query = %query, "Running verification query");

        let query_err = |reason: String| StoreError::Query {
            url: endpoint.clone(),
            reason,
        };

        let agent = ureq::AgentBuilder::new().timeout(self.query_timeout).build();
        let response = agent
            .get(&endpoint)
            .query("db", &self.database)
            .query("q", &query)
            .call()
            .map_err(|e| query_err(e.to_string()))?;
        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| query_err(e.to_string()))?;

        if let Some(message) = statement_error(&body) {
            return Err(query_err(message));
        }
        Ok(max_count(&body))
    }
}

fn statement_error(body: &serde_json::Value) -> Option<String> {
    if let Some(message) = body.get("error").and_then(|e| e.as_str()) {
        return Some(message.to_string());
    }
    body.get("results")?
        .as_array()?
        .iter()
        .find_map(|r| r.get("error").and_then(|e| e.as_str()).map(str::to_string))
}

/// Largest count cell in a `/query` response. Column 0 of every row is the
/// time; every other numeric cell is a per-field count.
pub fn max_count(body: &serde_json::Value) -> u64 {
    let rows = body
        .get("results")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|result| result.get("series").and_then(|s| s.as_array()))
        .flatten()
        .filter_map(|series| series.get("values").and_then(|v| v.as_array()))
        .flatten()
        .filter_map(|row| row.as_array());

    rows.flat_map(|row| row.iter().skip(1))
        .filter_map(|cell| cell.as_u64())
        .max()
        .unwrap_or(0)
}

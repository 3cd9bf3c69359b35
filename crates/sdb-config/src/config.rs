//! Typed representation of `sdb-import.toml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! configuration matching the stock deployment layout under `/sdb_puller`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Full importer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    pub paths: PathsConfig,
    pub pipeline: PipelineConfig,
    pub converter: ConverterConfig,
    pub store: StoreConfig,
    pub daemon: DaemonConfig,
}

impl ImportConfig {
    /// Parse a TOML document. Missing sections and fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Render as TOML, e.g. for `config show`.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// JSON Schema describing the file format.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(ImportConfig)).unwrap_or_default()
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Root of the snapshot tree, scanned recursively.
    pub sdb_dir: PathBuf,

    /// Parent of the per-date staging areas.
    pub scratch_dir: PathBuf,

    /// Parent of the per-date converter output areas.
    pub output_dir: PathBuf,

    /// Conversion logs and diagnostic bundles.
    pub log_dir: PathBuf,

    /// Append-only record of committed snapshots.
    pub ledger: PathBuf,

    /// Directory holding `datums{N}.lst` files.
    pub dictionary_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sdb_dir: PathBuf::from("/sdb"),
            scratch_dir: PathBuf::from("/sdb_puller/scratch"),
            output_dir: PathBuf::from("/sdb_puller/output"),
            log_dir: PathBuf::from("/sdb_puller/log"),
            ledger: PathBuf::from("/sdb_puller/log/imported.txt"),
            dictionary_dir: PathBuf::from("/sdb_puller/conf/datums"),
        }
    }
}

/// Per-file pipeline behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Wait before staging so the producer can finish writing.
    pub settle_delay_secs: u64,

    /// Seconds trimmed from each end of the hour when verifying.
    pub guard_band_secs: u64,

    /// Files imported concurrently within one pass.
    pub max_parallel: usize,

    /// Oldest two-digit year considered for import. `None` keeps everything.
    pub min_year: Option<u8>,

    /// Measurement name written on every line.
    pub measurement: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 30,
            guard_band_secs: 30,
            max_parallel: 1,
            min_year: None,
            measurement: "sdbfull".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn guard_band(&self) -> Duration {
        Duration::from_secs(self.guard_band_secs)
    }
}

/// External snapshot-to-CSV converter invocation.
///
/// Arguments may reference `{year}`, `{month}`, `{day}`, `{hour}`,
/// `{hour_end}`, `{date}`, `{staged}` and `{output}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "vagrant".to_string(),
            args: vec![
                "ssh".to_string(),
                "-c".to_string(),
                "/sdb_puller/bin/runStd.sh {year} {month} {day} {hour} {hour_end}".to_string(),
            ],
            working_dir: Some(PathBuf::from("/sdb_puller")),
            timeout_secs: 1800,
        }
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Time-series destination.
///
/// Import arguments may reference `{file}`, `{database}` and `{date}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub database: String,
    pub retention_policy: String,

    /// Base URL of the HTTP query endpoint.
    pub url: String,

    pub import_program: String,
    pub import_args: Vec<String>,
    pub import_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "sdbfull".to_string(),
            retention_policy: "autogen".to_string(),
            url: "http://localhost:8086".to_string(),
            import_program: "influx".to_string(),
            import_args: vec![
                "-import".to_string(),
                "-path={file}".to_string(),
                "-precision=ns".to_string(),
            ],
            import_timeout_secs: 600,
            query_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Which pending files a watch cycle imports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DaemonMode {
    /// Only the most recently created snapshot.
    #[default]
    Latest,
    /// Every pending snapshot, newest first.
    All,
}

impl std::fmt::Display for DaemonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonMode::Latest => write!(f, "latest"),
            DaemonMode::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for DaemonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "latest" => Ok(DaemonMode::Latest),
            "all" => Ok(DaemonMode::All),
            other => Err(format!("unknown daemon mode '{other}' (expected latest or all)")),
        }
    }
}

/// Watch loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub poll_interval_secs: u64,
    pub mode: DaemonMode,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 120,
            mode: DaemonMode::Latest,
        }
    }
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

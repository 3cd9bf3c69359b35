//! Configuration resolution and loading.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! /etc → built-in defaults.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ImportConfig;
use crate::validate::{validate_config, ValidationError};
use crate::CONFIG_FILENAME;

/// Environment variable naming a config file directly.
pub const ENV_CONFIG_PATH: &str = "SDB_IMPORT_CONFIG";

/// Environment variable naming a directory holding `sdb-import.toml`.
pub const ENV_CONFIG_DIR: &str = "SDB_IMPORT_CONFIG_DIR";

/// Application name for XDG and /etc directories.
const APP_NAME: &str = "sdb-import";

/// Where the configuration was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via `--config`.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/sdb-import/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Errors raised while locating, reading or validating the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::NotFound(_) => 67,
            ConfigError::Io { .. } => 60,
            ConfigError::Parse { .. } => 61,
            ConfigError::Invalid(e) => e.code(),
        }
    }
}

/// Candidate locations consulted after the CLI argument.
#[derive(Debug, Clone, Default)]
pub struct SearchPaths {
    pub env_config: Option<PathBuf>,
    pub env_config_dir: Option<PathBuf>,
    pub xdg_dir: Option<PathBuf>,
    pub system_dir: Option<PathBuf>,
}

impl SearchPaths {
    /// Search paths taken from the process environment.
    pub fn from_env() -> Self {
        Self {
            env_config: std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from),
            env_config_dir: std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from),
            xdg_dir: xdg_config_dir(),
            system_dir: Some(system_config_dir()),
        }
    }
}

/// A configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ImportConfig,
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
    /// SHA-256 of the file content, `None` for built-in defaults.
    pub hash: Option<String>,
}

/// Resolve the config path using the process environment.
pub fn resolve_config_path(cli_path: Option<&Path>) -> (Option<PathBuf>, ConfigSource) {
    resolve_in(cli_path, &SearchPaths::from_env())
}

/// Resolve the config path against explicit search paths.
///
/// A CLI path is returned even when it does not exist so that loading can
/// report it; every other candidate must exist to be chosen.
pub fn resolve_in(cli_path: Option<&Path>, search: &SearchPaths) -> (Option<PathBuf>, ConfigSource) {
    // 1. CLI argument
    if let Some(path) = cli_path {
        return (Some(path.to_path_buf()), ConfigSource::CliArgument);
    }

    // 2. Environment variable (direct path)
    if let Some(path) = &search.env_config {
        if path.exists() {
            return (Some(path.clone()), ConfigSource::Environment);
        }
    }

    // 3. Environment variable (config dir)
    if let Some(dir) = &search.env_config_dir {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::Environment);
        }
    }

    // 4. XDG config directory
    if let Some(dir) = &search.xdg_dir {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::XdgConfig);
        }
    }

    // 5. System config
    if let Some(dir) = &search.system_dir {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return (Some(path), ConfigSource::SystemConfig);
        }
    }

    // 6. Built-in default
    (None, ConfigSource::BuiltinDefault)
}

/// Resolve, read, parse and validate the configuration.
pub fn load_config(cli_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_from(cli_path, &SearchPaths::from_env())
}

/// [`load_config`] against explicit search paths.
pub fn load_from(cli_path: Option<&Path>, search: &SearchPaths) -> Result<LoadedConfig, ConfigError> {
    let (path, source) = resolve_in(cli_path, search);

    let Some(path) = path else {
        return Ok(LoadedConfig {
            config: ImportConfig::default(),
            path: None,
            source,
            hash: None,
        });
    };

    let loaded = load_file(&path, source)?;
    validate_config(&loaded.config)?;
    Ok(loaded)
}

/// Read and parse one file without validation.
pub fn load_file(path: &Path, source: ConfigSource) -> Result<LoadedConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = ImportConfig::from_toml_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(LoadedConfig {
        config,
        path: Some(path.to_path_buf()),
        source,
        hash: Some(hash_content(&content)),
    })
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Get the XDG config directory for sdb-import.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

//! SDB importer configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `sdb-import.toml`
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation with stable error codes

pub mod config;
pub mod resolve;
pub mod validate;

pub use config::{
    ConverterConfig, DaemonConfig, DaemonMode, ImportConfig, PathsConfig, PipelineConfig,
    StoreConfig,
};
pub use resolve::{
    load_config, load_file, load_from, resolve_config_path, resolve_in, ConfigError,
    ConfigSource, LoadedConfig, SearchPaths, ENV_CONFIG_DIR, ENV_CONFIG_PATH,
};
pub use validate::{
    placeholders, validate_config, ValidationError, ValidationResult, CONVERTER_PLACEHOLDERS,
    IMPORT_PLACEHOLDERS,
};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Standard config file name.
pub const CONFIG_FILENAME: &str = "sdb-import.toml";

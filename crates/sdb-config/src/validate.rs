//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::config::ImportConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Placeholders accepted in `converter.args`.
pub const CONVERTER_PLACEHOLDERS: &[&str] = &[
    "year", "month", "day", "hour", "hour_end", "date", "staged", "output",
];

/// Placeholders accepted in `store.import_args`.
pub const IMPORT_PLACEHOLDERS: &[&str] = &["file", "database", "date"];

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown placeholder {{{placeholder}}} in {field}")]
    UnknownPlaceholder { field: String, placeholder: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::UnknownPlaceholder { .. } => 66,
        }
    }
}

/// Validate the whole configuration semantically.
pub fn validate_config(config: &ImportConfig) -> ValidationResult<()> {
    let pipeline = &config.pipeline;
    if pipeline.max_parallel == 0 {
        return Err(ValidationError::InvalidValue {
            field: "pipeline.max_parallel".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    // Both ends of the hour are trimmed, so the band must leave a window.
    if pipeline.guard_band_secs >= 1800 {
        return Err(ValidationError::InvalidValue {
            field: "pipeline.guard_band_secs".to_string(),
            message: format!(
                "Must be below 1800 so the verification window is non-empty, got {}",
                pipeline.guard_band_secs
            ),
        });
    }

    if let Some(year) = pipeline.min_year {
        if year > 99 {
            return Err(ValidationError::InvalidValue {
                field: "pipeline.min_year".to_string(),
                message: format!("Must be a two-digit year, got {}", year),
            });
        }
    }

    require_non_empty("pipeline.measurement", &pipeline.measurement)?;
    require_non_empty("converter.program", &config.converter.program)?;
    require_non_empty("store.database", &config.store.database)?;
    require_non_empty("store.retention_policy", &config.store.retention_policy)?;
    require_non_empty("store.import_program", &config.store.import_program)?;

    if !config.store.url.starts_with("http://") && !config.store.url.starts_with("https://") {
        return Err(ValidationError::InvalidValue {
            field: "store.url".to_string(),
            message: format!("Must be an http(s) URL, got '{}'", config.store.url),
        });
    }

    require_positive("converter.timeout_secs", config.converter.timeout_secs)?;
    require_positive("store.import_timeout_secs", config.store.import_timeout_secs)?;
    require_positive("store.query_timeout_secs", config.store.query_timeout_secs)?;
    require_positive("daemon.poll_interval_secs", config.daemon.poll_interval_secs)?;

    check_placeholders("converter.args", &config.converter.args, CONVERTER_PLACEHOLDERS)?;
    check_placeholders("store.import_args", &config.store.import_args, IMPORT_PLACEHOLDERS)?;

    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

fn require_positive(field: &str, value: u64) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "Must be positive".to_string(),
        });
    }
    Ok(())
}

fn check_placeholders(field: &str, args: &[String], allowed: &[&str]) -> ValidationResult<()> {
    for (index, arg) in args.iter().enumerate() {
        for name in placeholders(arg) {
            if !allowed.contains(&name) {
                return Err(ValidationError::UnknownPlaceholder {
                    field: format!("{}[{}]", field, index),
                    placeholder: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Names of the `{name}` placeholders in `arg`, in order of appearance.
///
/// Only identifiers made of ASCII letters, digits and underscores count, so
/// shell braces such as `${HOME}` or `{ a; b; }` pass through untouched.
pub fn placeholders(arg: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = &after[..close];
        let preceded_by_dollar = rest[..open].ends_with('$');
        if !name.is_empty()
            && !preceded_by_dollar
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            found.push(name);
        }
        rest = &after[close + 1..];
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        validate_config(&ImportConfig::default()).unwrap();
    }

    #[test]
    fn zero_parallelism_rejected() {
        let mut config = ImportConfig::default();
        config.pipeline.max_parallel = 0;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.code(), 65);
        assert!(err.to_string().contains("pipeline.max_parallel"));
    }

    #[test]
    fn guard_band_must_leave_a_window() {
        let mut config = ImportConfig::default();
        config.pipeline.guard_band_secs = 1799;
        validate_config(&config).unwrap();
        config.pipeline.guard_band_secs = 1800;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn empty_measurement_is_missing() {
        let mut config = ImportConfig::default();
        config.pipeline.measurement = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(ref f) if f == "pipeline.measurement"));
    }

    #[test]
    fn zero_timeouts_rejected() {
        let mut config = ImportConfig::default();
        config.store.query_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn three_digit_min_year_rejected() {
        let mut config = ImportConfig::default();
        config.pipeline.min_year = Some(100);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn url_scheme_checked() {
        let mut config = ImportConfig::default();
        config.store.url = "localhost:8086".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn unknown_converter_placeholder_rejected() {
        let mut config = ImportConfig::default();
        config.converter.args.push("{minute}".to_string());
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.code(), 66);
        assert!(err.to_string().contains("{minute}"));
    }

    #[test]
    fn import_args_use_their_own_placeholders() {
        let mut config = ImportConfig::default();
        config.store.import_args.push("{year}".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn placeholder_scanner_skips_shell_braces() {
        assert_eq!(
            placeholders("run.sh {year} {hour_end} ${HOME} { a; }"),
            vec!["year", "hour_end"]
        );
        assert_eq!(placeholders("-path={file}"), vec!["file"]);
        assert!(placeholders("no braces {").is_empty());
    }
}

//! Snapshot-to-CSV conversion.
//!
//! The converter is an external utility that reads one hour of raw snapshot
//! data and writes one CSV per file type into the output area. The pipeline
//! only talks to it through the [`Converter`] trait.

use sdb_common::SnapshotFile;
use sdb_config::ConverterConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::tool_runner::{self, expand_placeholders, ToolError, ToolSpec};

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("converter `{command}` failed: {status}")]
    Failed { command: String, status: String },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Everything a converter needs for one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ConversionJob<'a> {
    pub file: &'a SnapshotFile,
    /// Copy of the raw snapshot in the scratch area.
    pub staged: &'a Path,
    /// Directory the converter writes CSV files into.
    pub output: &'a Path,
    /// Per-date conversion log, appended to.
    pub log: &'a Path,
}

/// Turns a staged snapshot into CSV files.
pub trait Converter: Send + Sync {
    fn convert(&self, job: &ConversionJob<'_>) -> Result<(), ConverterError>;
}

/// Runs the configured conversion command.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout())
            .with_working_dir(config.working_dir.clone())
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// The command that would run for `job`.
    pub fn spec_for(&self, job: &ConversionJob<'_>) -> ToolSpec {
        let window = job.file.token().window();
        let date = job.file.date();
        let staged = job.staged.to_string_lossy();
        let output = job.output.to_string_lossy();
        let vars = [
            ("year", window.year.as_str()),
            ("month", window.month.as_str()),
            ("day", window.day.as_str()),
            ("hour", window.hour.as_str()),
            ("hour_end", window.hour_end.as_str()),
            ("date", date.as_str()),
            ("staged", &*staged),
            ("output", &*output),
        ];

        let args = self
            .args
            .iter()
            .map(|arg| expand_placeholders(arg, &vars))
            .collect();
        ToolSpec::new(self.program.clone(), args, self.timeout).with_working_dir(self.working_dir.clone())
    }
}

impl Converter for CommandConverter {
    fn convert(&self, job: &ConversionJob<'_>) -> Result<(), ConverterError> {
        let spec = self.spec_for(job);
        let output = tool_runner::run(&spec)?;

        if let Err(e) = output.append_to_log(job.log) {
            warn!(log = %job.log.display(), error = %e, "Failed to write conversion log");
        }

        if output.success() {
            Ok(())
        } else {
            Err(ConverterError::Failed {
                command: output.command_line.clone(),
                status: output.status_text(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job_paths(tmp: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
        let staged = tmp.path().join("scratch/19031523/19031523.sdb.gz");
        let output = tmp.path().join("output/19031523");
        let log = tmp.path().join("log/19031523Std.log");
        std::fs::create_dir_all(&output).unwrap();
        (staged, output, log)
    }

    #[test]
    fn default_template_renders_window() {
        let tmp = TempDir::new().unwrap();
        let (staged, output, log) = job_paths(&tmp);
        let file = SnapshotFile::from_path("/sdb/19031523.sdb.gz").unwrap();
        let job = ConversionJob {
            file: &file,
            staged: &staged,
            output: &output,
            log: &log,
        };

        let converter = CommandConverter::from_config(&ConverterConfig::default());
        let spec = converter.spec_for(&job);
        assert_eq!(spec.program, "vagrant");
        assert_eq!(
            spec.args,
            vec!["ssh", "-c", "/sdb_puller/bin/runStd.sh 19 03 15 23 24"]
        );
        assert_eq!(spec.working_dir, Some(PathBuf::from("/sdb_puller")));
        assert_eq!(spec.timeout, Duration::from_secs(1800));
    }

    #[cfg(unix)]
    #[test]
    fn command_writes_output_and_log() {
        let tmp = TempDir::new().unwrap();
        let (staged, output, log) = job_paths(&tmp);
        let file = SnapshotFile::from_path("/sdb/19031514.sdb.gz").unwrap();
        let job = ConversionJob {
            file: &file,
            staged: &staged,
            output: &output,
            log: &log,
        };

        let converter = CommandConverter::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo converting {date} {hour} {hour_end}; echo 1,2 > {output}/x_1.csv".to_string(),
            ],
            Duration::from_secs(10),
        );
        converter.convert(&job).unwrap();

        assert_eq!(std::fs::read_to_string(output.join("x_1.csv")).unwrap(), "1,2\n");
        let logged = std::fs::read_to_string(&log).unwrap();
        assert!(logged.contains("converting 19031514 14 15"));
        assert!(logged.contains("[exit status 0]"));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_failure() {
        let tmp = TempDir::new().unwrap();
        let (staged, output, log) = job_paths(&tmp);
        let file = SnapshotFile::from_path("/sdb/19031514.sdb.gz").unwrap();
        let job = ConversionJob {
            file: &file,
            staged: &staged,
            output: &output,
            log: &log,
        };

        let converter = CommandConverter::new("sh", vec!["-c".into(), "exit 7".into()], Duration::from_secs(10));
        let err = converter.convert(&job).unwrap_err();
        assert!(matches!(err, ConverterError::Failed { ref status, .. } if status == "exit status 7"));
        assert!(log.exists());
    }

    #[test]
    fn missing_program_is_tool_error() {
        let tmp = TempDir::new().unwrap();
        let (staged, output, log) = job_paths(&tmp);
        let file = SnapshotFile::from_path("/sdb/19031514.sdb.gz").unwrap();
        let job = ConversionJob {
            file: &file,
            staged: &staged,
            output: &output,
            log: &log,
        };

        let converter = CommandConverter::new("/nonexistent/runStd", vec![], Duration::from_secs(1));
        assert!(matches!(
            converter.convert(&job),
            Err(ConverterError::Tool(ToolError::SpawnFailed { .. }))
        ));
    }
}

//! SDB Import Core Library
//!
//! This library provides the snapshot import pipeline:
//! - Binary snapshot decoding and datum dictionaries
//! - Line-protocol encoding of converter output
//! - Snapshot discovery and the at-most-once import ledger
//! - The per-file import state machine and polling daemon
//! - Exit codes, error taxonomy and structured logging for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod catalog;
pub mod converter;
pub mod daemon;
pub mod decode;
pub mod dictionary;
pub mod encode;
pub mod error;
pub mod exit_codes;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod tool_runner;
pub mod workspace;

pub use error::{ErrorSummary, ImportError};
pub use exit_codes::ExitCode;
pub use pipeline::{ImportOutcome, Importer, PassReport, PipelineSettings, PipelineState};

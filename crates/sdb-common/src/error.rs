//! Error classification shared by the importer crates.
//!
//! Concrete error enums live next to the code that raises them. This module
//! only provides the vocabulary used to group them in reports and logs:
//! - Category classification for error grouping
//! - Suggested follow-up actions for operators and automation
//!
//! A failure serialises into pass reports as:
//! ```json
//! {
//!   "code": 52,
//!   "category": "verification",
//!   "message": "no data found for 19031514 between 2019-03-15 14:00:30 and 2019-03-15 14:59:30",
//!   "suggested_action": "retry"
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Snapshot decoding errors (truncated headers or records).
    Decode,
    /// Datum dictionary lookup and parsing errors.
    Dictionary,
    /// Converter output parsing and encoding errors.
    Encode,
    /// External conversion utility failures.
    Conversion,
    /// Destination store write failures.
    Store,
    /// Post-write verification failures.
    Verification,
    /// Staging and working-area errors.
    Staging,
    /// Import ledger errors.
    Ledger,
    /// Configuration file errors.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Dictionary => write!(f, "dictionary"),
            ErrorCategory::Encode => write!(f, "encode"),
            ErrorCategory::Conversion => write!(f, "conversion"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Verification => write!(f, "verification"),
            ErrorCategory::Staging => write!(f, "staging"),
            ErrorCategory::Ledger => write!(f, "ledger"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested follow-up for an import failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Leave the file out of the ledger; the next pass retries it.
    Retry,
    /// Wait for a concurrent import of the same hour to finish.
    Wait,
    /// Skip this item and continue.
    Skip,
    /// Run `sdb-import config check`.
    RunCheck,
    /// Inspect the diagnostic bundle.
    InspectBundle,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::Wait => write!(f, "wait"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::InspectBundle => write!(f, "inspect_bundle"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_display_matches_serde() {
        for category in [
            ErrorCategory::Decode,
            ErrorCategory::Conversion,
            ErrorCategory::Verification,
            ErrorCategory::Io,
        ] {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
    }

    #[test]
    fn suggested_action_display() {
        assert_eq!(SuggestedAction::Retry.to_string(), "retry");
        assert_eq!(SuggestedAction::InspectBundle.to_string(), "inspect_bundle");
        assert_eq!(
            serde_json::to_string(&SuggestedAction::ManualIntervention).unwrap(),
            "\"manual_intervention\""
        );
    }
}

//! Import error taxonomy.
//!
//! Each pipeline step has its own error enum; [`ImportError`] collects them
//! and assigns the stable numeric code, category and suggested action that
//! appear in pass reports and `failure.json`.
//!
//! Code ranges:
//! - 30-39: input data (snapshot names, decoding, dictionaries, CSV)
//! - 50-59: pipeline steps and infrastructure

use sdb_bundle::BundleError;
use sdb_common::{ErrorCategory, SnapshotNameError, SuggestedAction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::converter::ConverterError;
use crate::decode::DecodeError;
use crate::dictionary::DictionaryError;
use crate::encode::EncodeError;
use crate::ledger::LedgerError;
use crate::store::{StoreError, VerifyWindow};
use crate::workspace::WorkspaceError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotNameError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Conversion(#[from] ConverterError),

    /// The store rejected a batch.
    #[error(transparent)]
    Write(StoreError),

    /// The verification query itself failed.
    #[error(transparent)]
    Query(StoreError),

    #[error("no data found for {window}")]
    VerificationMismatch { window: VerifyWindow },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("diagnostic bundle error: {0}")]
    Bundle(#[from] BundleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// Stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            ImportError::Snapshot(_) => 30,
            ImportError::Decode(_) => 31,
            ImportError::Dictionary(DictionaryError::NotFound { .. }) => 32,
            ImportError::Dictionary(_) => 33,
            ImportError::Encode(_) => 34,
            ImportError::Conversion(_) => 50,
            ImportError::Write(_) => 51,
            ImportError::VerificationMismatch { .. } => 52,
            ImportError::Workspace(WorkspaceError::Busy { .. }) => 53,
            ImportError::Ledger(_) => 54,
            ImportError::Bundle(_) => 55,
            ImportError::Query(_) => 56,
            ImportError::Workspace(_) => 57,
            ImportError::Io(_) => 58,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ImportError::Snapshot(_) | ImportError::Decode(_) => ErrorCategory::Decode,
            ImportError::Dictionary(_) => ErrorCategory::Dictionary,
            ImportError::Encode(_) => ErrorCategory::Encode,
            ImportError::Conversion(_) => ErrorCategory::Conversion,
            ImportError::Write(_) => ErrorCategory::Store,
            ImportError::Query(_) | ImportError::VerificationMismatch { .. } => ErrorCategory::Verification,
            ImportError::Workspace(_) => ErrorCategory::Staging,
            ImportError::Ledger(_) => ErrorCategory::Ledger,
            ImportError::Bundle(_) | ImportError::Io(_) => ErrorCategory::Io,
        }
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            ImportError::Workspace(WorkspaceError::Busy { .. }) => SuggestedAction::Wait,
            ImportError::Snapshot(_) | ImportError::Dictionary(DictionaryError::NotFound { .. }) => {
                SuggestedAction::Skip
            }
            ImportError::VerificationMismatch { .. } | ImportError::Query(_) => SuggestedAction::Retry,
            ImportError::Conversion(_)
            | ImportError::Write(_)
            | ImportError::Decode(_)
            | ImportError::Dictionary(_)
            | ImportError::Encode(_) => SuggestedAction::InspectBundle,
            ImportError::Ledger(_)
            | ImportError::Bundle(_)
            | ImportError::Workspace(_)
            | ImportError::Io(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// The date is being processed elsewhere; not a failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, ImportError::Workspace(WorkspaceError::Busy { .. }))
    }

    pub fn summary(&self) -> ErrorSummary {
        ErrorSummary {
            code: self.code(),
            category: self.category(),
            message: self.to_string(),
            suggested_action: self.suggested_action(),
        }
    }
}

/// Serializable view of an [`ImportError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub suggested_action: SuggestedAction,
}

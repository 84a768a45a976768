//! Error types for herbal-compliance

use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Error, Debug)]
pub enum ComplianceError {
    /// Malformed, missing, or out-of-range input. Nothing was written.
    #[error("Validation failed on {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{kind} with ID {id} does not exist")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} with ID {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Batch {batch_id} is already assigned to processor {processor}")]
    AlreadyAssigned { batch_id: String, processor: String },

    #[error("Cannot {action} {id}: current status is {status}")]
    InvalidState {
        id: String,
        status: String,
        action: &'static str,
    },

    #[error("Invalid status: {0}. Valid statuses: collected, assigned, testing, processing, manufactured")]
    InvalidStatus(String),

    /// The document changed between this operation's read and its write.
    /// Re-run the whole read-modify-write against a fresh read.
    #[error("Write conflict on {key}: value changed since it was read")]
    Conflict { key: String },

    #[error("Failed to decode {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl ComplianceError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn required(field: &'static str) -> Self {
        Self::validation(field, "is required")
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<LedgerError> for ComplianceError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Conflict { key, .. } => Self::Conflict { key },
            other => Self::Ledger(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ComplianceError>;

/// Reject empty or whitespace-only strings.
pub(crate) fn require_non_blank(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ComplianceError::required(field));
    }
    Ok(())
}

//! Domain errors for the refinement pipeline.

use thiserror::Error;

use super::models::{Phase, SubtaskStep};

/// Domain-level errors that can occur while refining a document.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Item not found in document {document_id}: {item_id}")]
    ItemNotFound { document_id: String, item_id: String },

    #[error("Invalid phase transition from {from} on {event}: {reason}")]
    InvalidStateTransition {
        from: Phase,
        event: String,
        reason: String,
    },

    /// A sub-task raised an error or exceeded its retry bound.
    #[error("{step} sub-task failed after {attempts} attempt(s): {reason}")]
    SubtaskFailure {
        step: SubtaskStep,
        attempts: u32,
        reason: String,
    },

    /// The store could not durably persist the document.
    #[error("Persistence failure for document {document_id}: {reason}")]
    PersistenceFailure { document_id: String, reason: String },

    /// The persisted header cannot be used to resume the pipeline.
    #[error("Invalid resume state for document {document_id}: {reason}")]
    InvalidResumeState { document_id: String, reason: String },

    #[error("Concurrency conflict: document {document_id} expected revision {expected}, found {found}")]
    ConcurrencyConflict {
        document_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Iteration cancelled during {0}")]
    Cancelled(SubtaskStep),

    #[error("{step} sub-task timed out after {seconds}s")]
    SubtaskTimeout { step: SubtaskStep, seconds: u64 },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether the failed operation may be retried without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SubtaskFailure { .. }
                | Self::PersistenceFailure { .. }
                | Self::Cancelled(_)
                | Self::SubtaskTimeout { .. }
                | Self::ConcurrencyConflict { .. }
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

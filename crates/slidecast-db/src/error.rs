//! Job store error types.

use slidecast_models::{JobId, JobStatus};
use thiserror::Error;

/// Result type for job store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// True if the write was refused by the state machine.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DbError::InvalidTransition { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

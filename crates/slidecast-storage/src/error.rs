//! Storage error types.

use std::path::PathBuf;

use slidecast_db::DbError;
use slidecast_models::{JobId, JobStatus};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while writing or reading job images.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors from resolving a job's encoded video.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Video for job {id} is not ready (status {status})")]
    NotReady { id: JobId, status: JobStatus },

    #[error("Video for job {0} is not available")]
    NotAvailable(JobId),

    #[error("Video for job {id} is missing at {}", .path.display())]
    Missing { id: JobId, path: PathBuf },

    #[error("Job store error: {0}")]
    Store(DbError),
}

impl From<DbError> for AssetError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => AssetError::NotFound(id),
            other => AssetError::Store(other),
        }
    }
}

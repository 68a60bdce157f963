//! Worker error types.

use std::fmt;

use slidecast_db::DbError;
use slidecast_media::MediaError;
use slidecast_models::{JobId, JobStatus};
use slidecast_queue::QueueError;
use slidecast_storage::StorageError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors returned to callers of the worker crate.
///
/// Failures of the work itself are not errors here: they end the job in
/// `failed` and are reported as a [`JobFailure`] inside the outcome.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} is {status}, expected pending")]
    InvalidState { id: JobId, status: JobStatus },

    #[error("Job store error: {0}")]
    Store(#[from] DbError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Map a store error, turning a missing record into [`WorkerError::NotFound`].
    pub(crate) fn from_store(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => WorkerError::NotFound(id),
            other => WorkerError::Store(other),
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, WorkerError::InvalidState { .. })
    }
}

/// Why a job ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// Input rejected before or during encoding (no images, bad timing)
    Validation(String),
    /// Filesystem error while reading or writing job files
    Io(String),
    /// The job's upload directory or an image vanished
    SourceNotFound(String),
    /// The encoder failed
    Encoding(String),
    /// Cancelled on request or at shutdown
    Cancelled,
    /// The process stopped while the job was processing
    Interrupted,
    /// The job's task panicked
    Panicked,
}

impl JobFailure {
    /// Metric label for this failure kind.
    pub fn reason(&self) -> &'static str {
        match self {
            JobFailure::Validation(_) => "validation",
            JobFailure::Io(_) => "io",
            JobFailure::SourceNotFound(_) => "source_not_found",
            JobFailure::Encoding(_) => "encoding",
            JobFailure::Cancelled => "cancelled",
            JobFailure::Interrupted => "interrupted",
            JobFailure::Panicked => "panicked",
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFailure::Validation(msg) => write!(f, "validation: {}", msg),
            JobFailure::Io(msg) => write!(f, "io: {}", msg),
            JobFailure::SourceNotFound(msg) => write!(f, "source not found: {}", msg),
            JobFailure::Encoding(msg) => write!(f, "encoding: {}", msg),
            JobFailure::Cancelled => f.write_str("cancelled"),
            JobFailure::Interrupted => f.write_str("interrupted"),
            JobFailure::Panicked => f.write_str("panicked"),
        }
    }
}

impl From<MediaError> for JobFailure {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Validation(msg) => JobFailure::Validation(msg),
            MediaError::SourceNotFound(path) => JobFailure::SourceNotFound(path.display().to_string()),
            MediaError::Cancelled => JobFailure::Cancelled,
            MediaError::Io(e) => JobFailure::Io(e.to_string()),
            other => match other.stderr() {
                Some(stderr) => JobFailure::Encoding(format!("{}\n{}", other, stderr)),
                None => JobFailure::Encoding(other.to_string()),
            },
        }
    }
}

impl From<StorageError> for JobFailure {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(msg) => JobFailure::Validation(msg),
            StorageError::SourceNotFound(path) => JobFailure::SourceNotFound(path.display().to_string()),
            StorageError::Io(e) => JobFailure::Io(e.to_string()),
        }
    }
}

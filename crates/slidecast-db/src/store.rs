//! The job store interface.

use async_trait::async_trait;
use slidecast_models::{Job, JobId, JobStatus, NewJob};

use crate::error::{DbError, DbResult};
use crate::metrics::record_rejected_transition;

/// A status write: the target state plus the fields that travel with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    /// Public artifact reference, required for `done` and forbidden otherwise
    pub video_path: Option<String>,
    /// Failure cause, only meaningful for `failed`
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            video_path: None,
            error_message: None,
        }
    }

    pub fn done(video_path: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Done,
            video_path: Some(video_path.into()),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            video_path: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Apply this update to `job`, returning the new record.
    pub(crate) fn apply(&self, job: &Job, now: chrono::DateTime<chrono::Utc>) -> Job {
        Job {
            status: self.status,
            video_path: self.video_path.clone(),
            error_message: self.error_message.clone(),
            updated_at: now,
            ..job.clone()
        }
    }
}

/// Persistence for job records.
///
/// Implementations own the stored representation and must perform the
/// transition check and the write as one atomic step.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job and return it with its assigned id.
    async fn create(&self, new_job: NewJob) -> DbResult<Job>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> DbResult<Job>;

    /// Move a job to `update.status`.
    ///
    /// Fails with [`DbError::InvalidTransition`] when the move is not legal
    /// from the current state and [`DbError::InvalidRecord`] when the update
    /// would break the `video_path` invariant.
    async fn update_status(&self, id: JobId, update: StatusUpdate) -> DbResult<Job>;

    /// All jobs currently in `status`, ordered by id.
    async fn list_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>>;
}

/// Validate `update` against the current record.
pub fn check_update(current: &Job, update: &StatusUpdate) -> DbResult<()> {
    let has_path = update.video_path.as_deref().is_some_and(|p| !p.is_empty());
    if has_path != (update.status == JobStatus::Done) {
        return Err(DbError::invalid_record(format!(
            "video_path must be set exactly when status is done (status {}, video_path {:?})",
            update.status, update.video_path
        )));
    }

    if update.error_message.is_some() && update.status != JobStatus::Failed {
        return Err(DbError::invalid_record(format!(
            "error_message is only allowed on failed jobs (status {})",
            update.status
        )));
    }

    if !current.status.can_transition_to(update.status) {
        record_rejected_transition(current.status.as_str(), update.status.as_str());
        return Err(DbError::InvalidTransition {
            id: current.id,
            from: current.status,
            to: update.status,
        });
    }

    Ok(())
}

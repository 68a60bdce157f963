//! Queue error types.

use slidecast_models::JobId;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Job {0} is already queued")]
    Duplicate(JobId),

    #[error("Queue is full ({capacity} jobs waiting)")]
    Full { capacity: usize },
}

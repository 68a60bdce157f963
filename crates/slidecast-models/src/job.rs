//! Job records and the job lifecycle state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier for a job, assigned by the job store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    /// Get the inner value.
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Directory name used for this job's uploads (`job_{id}`).
    pub fn dir_name(&self) -> String {
        format!("job_{}", self.0)
    }

    /// File name of this job's encoded video (`job_{id}.mp4`).
    pub fn video_file_name(&self) -> String {
        format!("job_{}.mp4", self.0)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(JobId)
    }
}

/// Job lifecycle state.
///
/// `pending -> processing -> done | failed`. `done` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is created and waiting for a worker
    #[default]
    Pending,
    /// Job is being encoded
    Processing,
    /// Job finished and its video is available
    Done,
    /// Job failed; no video is available
    Failed,
}

impl JobStatus {
    /// All states, in lifecycle order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates accepted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a persisted status string is not one of the four states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// Fields supplied by the caller when creating a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NewJob {
    pub title: String,
    pub text_content: String,
}

impl NewJob {
    pub fn new(title: impl Into<String>, text_content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text_content: text_content.into(),
        }
    }
}

/// A slideshow job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Title supplied at creation
    pub title: String,

    /// Free text supplied at creation
    pub text_content: String,

    /// Lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Public reference to the encoded video; set only when `status` is `done`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,

    /// Failure cause for operators; set only when `status` is `failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last status write
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a freshly created job in the `pending` state.
    pub fn pending(id: JobId, new_job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new_job.title,
            text_content: new_job.text_content,
            status: JobStatus::Pending,
            video_path: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `video_path` is present exactly when the job is done.
    pub fn is_consistent(&self) -> bool {
        self.video_path.is_some() == (self.status == JobStatus::Done)
    }
}

//! Structured job logging utilities.
//!
//! Every job lifecycle event carries the job id and the operation, so log
//! lines of concurrently running jobs can be told apart.

use tracing::{error, info, warn, Span};

use slidecast_models::JobId;

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation
    /// (e.g. `"encode"`, `"submit"`, `"recover"`).
    pub fn new(job_id: JobId, operation: &'static str) -> Self {
        Self { job_id, operation }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    /// Log a failure together with its kind.
    pub fn log_failure(&self, reason: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            reason,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Create a tracing span for this job.
    ///
    /// Instrumenting a job future with it tags encoder and store logs with the
    /// same job id.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}

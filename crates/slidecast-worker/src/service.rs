//! Job submission.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use slidecast_models::{Job, NewJob};
use slidecast_queue::JobQueue;
use slidecast_storage::UploadedImage;

use crate::error::{JobFailure, WorkerError, WorkerResult};
use crate::orchestrator::Orchestrator;

/// What happened to a submitted job.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Stored and waiting for a worker
    Queued(Job),
    /// Stored, but its uploads were unusable; the job is already `failed`
    Rejected { job: Job, failure: JobFailure },
}

impl SubmitOutcome {
    pub fn job(&self) -> &Job {
        match self {
            SubmitOutcome::Queued(job) => job,
            SubmitOutcome::Rejected { job, .. } => job,
        }
    }
}

/// Creates jobs: record, uploads, then queue.
///
/// Returns as soon as the job is queued; progress is observed by polling the
/// job store.
#[derive(Clone)]
pub struct JobService {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<JobQueue>,
}

impl JobService {
    pub fn new(orchestrator: Arc<Orchestrator>, queue: Arc<JobQueue>) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    /// Submit a new job.
    ///
    /// If the uploads cannot be stored (for instance, there are none) the
    /// job is failed right away and [`SubmitOutcome::Rejected`] is returned.
    /// If the queue refuses the job it stays `pending` and is picked up again
    /// on the next start.
    pub async fn submit(&self, new_job: NewJob, images: Vec<UploadedImage>) -> WorkerResult<SubmitOutcome> {
        let job = self.orchestrator.store().create(new_job).await?;
        let image_count = images.len();

        if let Err(err) = self.orchestrator.intake().materialize(job.id, images).await {
            let failure = JobFailure::from(err);
            let job = self.orchestrator.reject(job.id, &failure).await?;
            return Ok(SubmitOutcome::Rejected { job, failure });
        }

        if let Err(e) = self.queue.enqueue(job.id).await {
            warn!(job_id = %job.id, "Job stored but not queued: {}", e);
            return Err(WorkerError::Queue(e));
        }

        counter!("slidecast_jobs_enqueued_total").increment(1);
        info!(job_id = %job.id, images = image_count, "Job queued");
        Ok(SubmitOutcome::Queued(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMode, Harness};
    use slidecast_models::JobStatus;

    fn service_for(h: &Harness) -> (JobService, Arc<JobQueue>) {
        let queue = Arc::new(JobQueue::default());
        (JobService::new(Arc::clone(&h.orchestrator), Arc::clone(&queue)), queue)
    }

    #[tokio::test]
    async fn test_submit_stores_and_queues() {
        let h = Harness::new(FakeMode::Succeed).await;
        let (service, queue) = service_for(&h);

        let outcome = service
            .submit(
                NewJob::new("Trip", "Day one"),
                vec![
                    UploadedImage::new("a.png", b"a".to_vec()),
                    UploadedImage::new("b.png", b"b".to_vec()),
                ],
            )
            .await
            .unwrap();

        let SubmitOutcome::Queued(job) = outcome else {
            panic!("expected queued");
        };
        assert_eq!(job.status, JobStatus::Pending);
        assert!(queue.contains(job.id).await);
        assert_eq!(h.intake.scan(job.id).await.unwrap().len(), 2);
        assert_eq!(h.encoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_submit_without_images_is_rejected() {
        let h = Harness::new(FakeMode::Succeed).await;
        let (service, queue) = service_for(&h);

        let outcome = service.submit(NewJob::new("Empty", ""), Vec::new()).await.unwrap();

        let SubmitOutcome::Rejected { job, failure } = outcome else {
            panic!("expected rejected");
        };
        assert!(matches!(failure, JobFailure::Validation(_)));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.video_path.is_none());
        assert!(queue.is_empty().await);
        assert_eq!(h.encoder.calls(), 0);
        assert_eq!(h.store.get(job.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_closed_queue_leaves_job_pending() {
        let h = Harness::new(FakeMode::Succeed).await;
        let (service, queue) = service_for(&h);
        queue.close().await;

        let err = service
            .submit(NewJob::new("Late", ""), vec![UploadedImage::new("a.png", b"a".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Queue(_)));

        let pending = h.store.list_by_status(JobStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}

//! Job orchestration.
//!
//! Drives one job through `pending -> processing -> done | failed`: reads the
//! job's images back from intake, runs the encoder and records the result.
//! Every failure of the work itself ends the job in `failed` with its cause
//! logged and stored; only bookkeeping problems surface as [`WorkerError`].

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{info, warn, Instrument};

use slidecast_db::{DbError, JobStore, StatusUpdate};
use slidecast_media::{EncodeRequest, SlideshowEncoder};
use slidecast_models::{Job, JobId, JobStatus, VideoAsset};
use slidecast_storage::{StorageConfig, UploadIntake};

use crate::error::{JobFailure, WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done(VideoAsset),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, JobOutcome::Done(_))
    }
}

/// Coordinates intake, encoder and job store for individual jobs.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    intake: UploadIntake,
    encoder: Arc<dyn SlideshowEncoder>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        intake: UploadIntake,
        encoder: Arc<dyn SlideshowEncoder>,
    ) -> Self {
        Self {
            store,
            intake,
            encoder,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn intake(&self) -> &UploadIntake {
        &self.intake
    }

    /// Encode a pending job.
    ///
    /// Fails with [`WorkerError::InvalidState`] when the job is not pending,
    /// including when another caller moved it to `processing` first. Once the
    /// job is `processing` it is never left there: the call returns with the
    /// job `done` or `failed`.
    pub async fn run_job(
        &self,
        job_id: JobId,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(job_id, "encode");
        let span = logger.create_span();
        self.run_job_logged(job_id, cancel, logger).instrument(span).await
    }

    async fn run_job_logged(
        &self,
        job_id: JobId,
        cancel: watch::Receiver<bool>,
        logger: JobLogger,
    ) -> WorkerResult<JobOutcome> {
        let job = self.store.get(job_id).await.map_err(WorkerError::from_store)?;
        if job.status != JobStatus::Pending {
            return Err(WorkerError::InvalidState {
                id: job_id,
                status: job.status,
            });
        }
        self.claim(job_id).await?;
        logger.log_start(&format!("\"{}\"", job.title));

        let started = Instant::now();
        let result = self.encode(job_id, cancel).await;
        histogram!("slidecast_encode_duration_seconds").record(started.elapsed().as_secs_f64());

        let asset = match result {
            Ok(asset) => asset,
            Err(failure) => {
                self.fail(job_id, &failure, &logger).await?;
                return Ok(JobOutcome::Failed(failure));
            }
        };

        let video_path = StorageConfig::public_video_path(job_id);
        match self.store.update_status(job_id, StatusUpdate::done(&video_path)).await {
            Ok(_) => {
                counter!("slidecast_jobs_completed_total").increment(1);
                logger.log_completion(&format!(
                    "{} ({:.1}s, {} frames)",
                    video_path, asset.duration_secs, asset.frame_count
                ));
                Ok(JobOutcome::Done(asset))
            }
            Err(e) => {
                logger.log_warning(&format!("could not record completion: {}", e));
                if let Err(remove_err) = tokio::fs::remove_file(&asset.path).await {
                    warn!(job_id = %job_id, "Failed to remove unrecorded video: {}", remove_err);
                }
                let failure = JobFailure::Io(format!("failed to record completion: {}", e));
                self.fail(job_id, &failure, &logger).await?;
                Ok(JobOutcome::Failed(failure))
            }
        }
    }

    /// Fail a pending job without encoding it.
    ///
    /// Used when submission cannot complete (e.g. no images were uploaded).
    /// The job still walks `pending -> processing -> failed`.
    pub async fn reject(&self, job_id: JobId, failure: &JobFailure) -> WorkerResult<Job> {
        let logger = JobLogger::new(job_id, "reject");
        self.claim(job_id).await?;
        self.fail(job_id, failure, &logger).await
    }

    /// Settle jobs left behind by a previous process.
    ///
    /// Jobs still `processing` are failed as interrupted. Returns the ids of
    /// `pending` jobs, which should be queued again.
    pub async fn recover(&self) -> WorkerResult<Vec<JobId>> {
        let orphaned = self.store.list_by_status(JobStatus::Processing).await?;
        for job in &orphaned {
            let logger = JobLogger::new(job.id, "recover");
            if let Err(e) = self.fail(job.id, &JobFailure::Interrupted, &logger).await {
                warn!(job_id = %job.id, "Failed to settle interrupted job: {}", e);
            }
        }

        let pending: Vec<JobId> = self
            .store
            .list_by_status(JobStatus::Pending)
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();

        info!(
            interrupted = orphaned.len(),
            pending = pending.len(),
            "Recovered job state"
        );
        Ok(pending)
    }

    /// Fail a job whose run ended without settling it.
    ///
    /// Returns `None` when the job is no longer `processing`.
    pub async fn fail_stranded(&self, job_id: JobId, failure: &JobFailure) -> WorkerResult<Option<Job>> {
        let job = self.store.get(job_id).await.map_err(WorkerError::from_store)?;
        if job.status != JobStatus::Processing {
            return Ok(None);
        }

        let logger = JobLogger::new(job_id, "settle");
        match self.fail(job_id, failure, &logger).await {
            Ok(job) => Ok(Some(job)),
            // Settled by someone else in the meantime.
            Err(WorkerError::Store(DbError::InvalidTransition { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `pending -> processing`; losing a race is an invalid state.
    async fn claim(&self, job_id: JobId) -> WorkerResult<()> {
        match self.store.update_status(job_id, StatusUpdate::processing()).await {
            Ok(_) => Ok(()),
            Err(DbError::InvalidTransition { from, .. }) => Err(WorkerError::InvalidState {
                id: job_id,
                status: from,
            }),
            Err(e) => Err(WorkerError::from_store(e)),
        }
    }

    async fn encode(
        &self,
        job_id: JobId,
        cancel: watch::Receiver<bool>,
    ) -> Result<VideoAsset, JobFailure> {
        let images = self.intake.scan(job_id).await?;
        let request = EncodeRequest {
            job_id,
            images,
            output_path: self.intake.config().video_path(job_id),
        };
        Ok(self.encoder.encode(&request, cancel).await?)
    }

    async fn fail(&self, job_id: JobId, failure: &JobFailure, logger: &JobLogger) -> WorkerResult<Job> {
        logger.log_failure(failure.reason(), &failure.to_string());
        counter!("slidecast_jobs_failed_total", "reason" => failure.reason()).increment(1);

        self.store
            .update_status(job_id, StatusUpdate::failed(failure.to_string()))
            .await
            .map_err(WorkerError::from_store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMode, Harness};
    use slidecast_db::InMemoryJobStore;
    use slidecast_storage::UploadedImage;

    fn three_images() -> Vec<UploadedImage> {
        vec![
            UploadedImage::new("a.png", b"A".to_vec()),
            UploadedImage::new("b.jpg", b"B".to_vec()),
            UploadedImage::new("c.gif", b"C".to_vec()),
        ]
    }

    #[tokio::test]
    async fn test_three_images_end_done() {
        let h = Harness::new(FakeMode::Succeed).await;
        let job = h.pending_job(three_images()).await;

        let outcome = h.orchestrator.run_job(job.id, h.no_cancel()).await.unwrap();

        let JobOutcome::Done(asset) = outcome else {
            panic!("expected done, got {:?}", outcome);
        };
        assert!((asset.duration_secs - 6.0).abs() < 1e-9);
        assert_eq!(asset.frame_count, 144);

        let stored = h.store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Done);
        assert_eq!(stored.video_path.as_deref(), Some("/videos/job_1.mp4"));
        assert!(stored.error_message.is_none());

        // Encoder saw images in upload order
        assert_eq!(tokio::fs::read(&asset.path).await.unwrap(), b"ABC");
    }

    #[tokio::test]
    async fn test_missing_upload_dir_fails_job() {
        let h = Harness::new(FakeMode::Succeed).await;
        let job = h.pending_job(three_images()).await;
        tokio::fs::remove_dir_all(h.intake.job_dir(job.id)).await.unwrap();

        let outcome = h.orchestrator.run_job(job.id, h.no_cancel()).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Failed(JobFailure::SourceNotFound(_))));
        let stored = h.store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.video_path.is_none());
        assert_eq!(h.encoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_encoder_failure_fails_job_with_cause() {
        let h = Harness::new(FakeMode::FailEncoding).await;
        let job = h.pending_job(three_images()).await;

        let outcome = h.orchestrator.run_job(job.id, h.no_cancel()).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Failed(JobFailure::Encoding(_))));
        let stored = h.store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.video_path.is_none());
        assert!(stored.error_message.unwrap().starts_with("encoding:"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let h = Harness::new(FakeMode::Succeed).await;
        let err = h.orchestrator.run_job(JobId(77), h.no_cancel()).await.unwrap_err();
        assert!(matches!(err, WorkerError::NotFound(JobId(77))));
    }

    #[tokio::test]
    async fn test_terminal_job_is_invalid_state() {
        let h = Harness::new(FakeMode::Succeed).await;
        let job = h.pending_job(three_images()).await;
        h.orchestrator.run_job(job.id, h.no_cancel()).await.unwrap();

        let err = h.orchestrator.run_job(job.id, h.no_cancel()).await.unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(h.encoder.calls(), 1);
        assert_eq!(h.store.get(job.id).await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_racing_runs_only_one_encodes() {
        let h = Harness::new(FakeMode::Succeed).await;
        let job = h.pending_job(three_images()).await;

        let (a, b) = tokio::join!(
            h.orchestrator.run_job(job.id, h.no_cancel()),
            h.orchestrator.run_job(job.id, h.no_cancel()),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_invalid_state()));
        assert_eq!(h.encoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_fails_job_without_output() {
        let h = Harness::new(FakeMode::WaitForCancel).await;
        let job = h.pending_job(three_images()).await;
        let (tx, rx) = watch::channel(false);

        let run = h.orchestrator.run_job(job.id, rx);
        let cancel = async {
            h.encoder.started().await;
            assert_eq!(h.store.get(job.id).await.unwrap().status, JobStatus::Processing);
            tx.send(true).unwrap();
        };
        let (outcome, _) = tokio::join!(run, cancel);

        assert_eq!(outcome.unwrap(), JobOutcome::Failed(JobFailure::Cancelled));
        let stored = h.store.get(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("cancelled"));
        assert!(!h.storage.video_path(job.id).exists());
    }

    #[tokio::test]
    async fn test_reject_walks_legal_path() {
        let h = Harness::new(FakeMode::Succeed).await;
        let job = h.store.create(slidecast_models::NewJob::new("empty", "")).await.unwrap();

        let failed = h
            .orchestrator
            .reject(job.id, &JobFailure::Validation("no images".into()))
            .await
            .unwrap();

        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.video_path.is_none());
        assert_eq!(failed.error_message.as_deref(), Some("validation: no images"));
        assert_eq!(h.encoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_recover_settles_processing_and_returns_pending() {
        let h = Harness::new(FakeMode::Succeed).await;
        let orphan = h.pending_job(three_images()).await;
        let waiting = h.pending_job(three_images()).await;
        h.store.update_status(orphan.id, StatusUpdate::processing()).await.unwrap();

        let pending = h.orchestrator.recover().await.unwrap();

        assert_eq!(pending, vec![waiting.id]);
        let settled = h.store.get(orphan.id).await.unwrap();
        assert_eq!(settled.status, JobStatus::Failed);
        assert_eq!(settled.error_message.as_deref(), Some("interrupted"));
    }

    #[tokio::test]
    async fn test_concurrent_jobs_do_not_mix() {
        let h = Harness::new(FakeMode::Succeed).await;
        let first = h
            .pending_job(vec![
                UploadedImage::new("1.png", b"x1".to_vec()),
                UploadedImage::new("2.png", b"x2".to_vec()),
            ])
            .await;
        let second = h
            .pending_job(vec![UploadedImage::new("1.jpg", b"y1".to_vec())])
            .await;

        let (a, b) = tokio::join!(
            h.orchestrator.run_job(first.id, h.no_cancel()),
            h.orchestrator.run_job(second.id, h.no_cancel()),
        );
        let (JobOutcome::Done(a), JobOutcome::Done(b)) = (a.unwrap(), b.unwrap()) else {
            panic!("both jobs should finish");
        };

        assert_eq!(tokio::fs::read(&a.path).await.unwrap(), b"x1x2");
        assert_eq!(tokio::fs::read(&b.path).await.unwrap(), b"y1");
        assert_ne!(a.path, b.path);
        assert_eq!(a.frame_count, 96);
        assert_eq!(b.frame_count, 48);
    }

    #[tokio::test]
    async fn test_video_path_invariant_holds_throughout() {
        let store = Arc::new(InMemoryJobStore::new());
        let h = Harness::with_store(FakeMode::Succeed, store.clone()).await;
        let job = h.pending_job(three_images()).await;

        assert!(store.get(job.id).await.unwrap().is_consistent());
        h.orchestrator.run_job(job.id, h.no_cancel()).await.unwrap();
        assert!(store.get(job.id).await.unwrap().is_consistent());
    }
}

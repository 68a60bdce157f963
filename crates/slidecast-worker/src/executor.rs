//! Worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use slidecast_models::{Job, JobId, JobStatus};
use slidecast_queue::{JobQueue, QueueError};

use crate::config::WorkerConfig;
use crate::error::{JobFailure, WorkerError, WorkerResult};
use crate::orchestrator::{JobOutcome, Orchestrator};

/// How long in-flight jobs get to wind down after being cancelled at shutdown.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The job was still queued; it was removed and failed directly.
    Withdrawn(Job),
    /// The job's cancel signal was raised; its worker will fail it.
    /// Carries the status observed after signalling.
    Signalled(JobStatus),
    /// The job had already finished.
    AlreadyFinished(JobStatus),
}

/// Per-job cancel signals.
///
/// A signal can be raised before a worker picks the job up; the worker then
/// starts with the signal already set.
#[derive(Debug, Default)]
struct CancelRegistry {
    senders: Mutex<HashMap<JobId, watch::Sender<bool>>>,
}

impl CancelRegistry {
    async fn register(&self, job_id: JobId) -> watch::Receiver<bool> {
        self.senders
            .lock()
            .await
            .entry(job_id)
            .or_insert_with(|| watch::channel(false).0)
            .subscribe()
    }

    async fn signal(&self, job_id: JobId) {
        let mut senders = self.senders.lock().await;
        match senders.get(&job_id) {
            Some(tx) => {
                tx.send_replace(true);
            }
            None => {
                let (tx, _) = watch::channel(true);
                senders.insert(job_id, tx);
            }
        }
    }

    async fn signal_all(&self) {
        for tx in self.senders.lock().await.values() {
            tx.send_replace(true);
        }
    }

    async fn release(&self, job_id: JobId) {
        self.senders.lock().await.remove(&job_id);
    }

    async fn job_ids(&self) -> Vec<JobId> {
        self.senders.lock().await.keys().copied().collect()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.senders.lock().await.len()
    }
}

/// A fixed set of workers consuming the job queue.
///
/// Each worker takes one job id, runs it to completion, then takes the next.
pub struct WorkerPool {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
    cancels: Arc<CancelRegistry>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `config.max_concurrent_jobs` workers.
    pub fn start(config: WorkerConfig, queue: Arc<JobQueue>, orchestrator: Arc<Orchestrator>) -> Self {
        let cancels = Arc::new(CancelRegistry::default());
        let (shutdown, _) = watch::channel(false);

        let workers = (0..config.max_concurrent_jobs)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&queue),
                    Arc::clone(&orchestrator),
                    Arc::clone(&cancels),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        info!(
            workers = config.max_concurrent_jobs,
            "Started worker pool"
        );

        Self {
            config,
            queue,
            orchestrator,
            cancels,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Settle jobs from a previous run and queue the pending ones again.
    ///
    /// Returns how many jobs were queued.
    pub async fn resume(&self) -> WorkerResult<usize> {
        let pending = self.orchestrator.recover().await?;
        self.prune_finished().await;
        let mut queued = 0;
        for job_id in pending {
            match self.queue.enqueue(job_id).await {
                Ok(()) => queued += 1,
                Err(QueueError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(queued)
    }

    /// Cancel a job that has not finished yet.
    pub async fn cancel(&self, job_id: JobId) -> WorkerResult<CancelOutcome> {
        let job = self
            .orchestrator
            .store()
            .get(job_id)
            .await
            .map_err(WorkerError::from_store)?;
        if job.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished(job.status));
        }

        if self.queue.remove(job_id).await {
            match self.orchestrator.reject(job_id, &JobFailure::Cancelled).await {
                Ok(job) => return Ok(CancelOutcome::Withdrawn(job)),
                // Not ours to fail any more; fall back to the signal.
                Err(e) if e.is_invalid_state() => {}
                Err(e) => return Err(e),
            }
        }

        self.cancels.signal(job_id).await;
        info!(job_id = %job_id, "Cancel signalled");

        // A job that finished after it was read never takes its signal.
        self.prune_finished().await;
        let status = self
            .orchestrator
            .store()
            .get(job_id)
            .await
            .map(|latest| latest.status)
            .unwrap_or(job.status);
        Ok(CancelOutcome::Signalled(status))
    }

    /// Drop cancel signals of jobs that have already finished.
    async fn prune_finished(&self) {
        for job_id in self.cancels.job_ids().await {
            match self.orchestrator.store().get(job_id).await {
                Ok(job) if job.is_terminal() => {
                    debug!(job_id = %job_id, "Dropping cancel signal of finished job");
                    self.cancels.release(job_id).await;
                }
                Ok(_) => {}
                Err(e) => debug!(job_id = %job_id, "Could not check cancelled job: {}", e),
            }
        }
    }

    /// Stop taking jobs and wait for in-flight ones.
    ///
    /// Jobs still running after the shutdown timeout are cancelled. Queued
    /// jobs stay `pending` and are picked up again by [`WorkerPool::resume`].
    pub async fn shutdown(&self) {
        info!("Shutting down worker pool");
        self.shutdown.send_replace(true);
        self.queue.close().await;

        let handles = std::mem::take(&mut *self.workers.lock().await);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut wait = Box::pin(async move {
            for handle in handles {
                let _ = handle.await;
            }
        });

        if tokio::time::timeout(self.config.shutdown_timeout, &mut wait).await.is_err() {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Shutdown timeout reached, cancelling in-flight jobs"
            );
            self.cancels.signal_all().await;
            if tokio::time::timeout(CANCEL_GRACE, &mut wait).await.is_err() {
                error!("Workers did not stop, aborting");
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    queue: Arc<JobQueue>,
    orchestrator: Arc<Orchestrator>,
    cancels: Arc<CancelRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "Worker started");

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let job_id = tokio::select! {
            next = queue.dequeue() => match next {
                Some(job_id) => job_id,
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        let cancel = cancels.register(job_id).await;
        gauge!("slidecast_jobs_in_flight").increment(1.0);

        // A panicking job must not take the worker down with it.
        let task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.run_job(job_id, cancel).await })
        };

        match task.await {
            Ok(Ok(JobOutcome::Done(_))) => debug!(worker, job_id = %job_id, "Job done"),
            Ok(Ok(JobOutcome::Failed(failure))) => {
                debug!(worker, job_id = %job_id, reason = failure.reason(), "Job failed")
            }
            Ok(Err(e)) if e.is_invalid_state() => {
                warn!(worker, job_id = %job_id, "Skipping job: {}", e)
            }
            Ok(Err(e)) => error!(worker, job_id = %job_id, "Job bookkeeping failed: {}", e),
            Err(e) => {
                error!(worker, job_id = %job_id, "Job task panicked: {}", e);
                let failure = if e.is_panic() {
                    JobFailure::Panicked
                } else {
                    JobFailure::Interrupted
                };
                if let Err(settle_err) = orchestrator.fail_stranded(job_id, &failure).await {
                    error!(worker, job_id = %job_id, "Could not settle job after panic: {}", settle_err);
                }
            }
        }

        cancels.release(job_id).await;
        gauge!("slidecast_jobs_in_flight").decrement(1.0);
    }

    debug!(worker, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMode, Harness};
    use slidecast_storage::UploadedImage;

    fn images(n: usize) -> Vec<UploadedImage> {
        (0..n)
            .map(|i| UploadedImage::new(format!("{i}.png"), vec![b'a' + i as u8]))
            .collect()
    }

    fn pool_for(h: &Harness, workers: usize) -> WorkerPool {
        let config = WorkerConfig {
            max_concurrent_jobs: workers,
            shutdown_timeout: Duration::from_secs(5),
            work_dir: h.dir.path().join("work"),
        };
        WorkerPool::start(config, Arc::new(JobQueue::default()), Arc::clone(&h.orchestrator))
    }

    async fn wait_for_status(h: &Harness, job_id: JobId, status: JobStatus) -> Job {
        for _ in 0..200 {
            let job = h.store.get(job_id).await.unwrap();
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", job_id, status);
    }

    #[tokio::test]
    async fn test_pool_processes_queued_jobs() {
        let h = Harness::new(FakeMode::Succeed).await;
        let pool = pool_for(&h, 2);

        let mut ids = Vec::new();
        for n in 1..=4 {
            let job = h.pending_job(images(n)).await;
            pool.queue().enqueue(job.id).await.unwrap();
            ids.push(job.id);
        }

        for id in &ids {
            let job = wait_for_status(&h, *id, JobStatus::Done).await;
            assert_eq!(job.video_path, Some(format!("/videos/job_{}.mp4", id)));
        }
        pool.shutdown().await;
        assert_eq!(h.encoder.calls(), 4);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stall_worker() {
        let h = Harness::new(FakeMode::Succeed).await;
        let pool = pool_for(&h, 1);

        let broken = h.pending_job(images(1)).await;
        tokio::fs::remove_dir_all(h.intake.job_dir(broken.id)).await.unwrap();
        let healthy = h.pending_job(images(2)).await;

        pool.queue().enqueue(broken.id).await.unwrap();
        pool.queue().enqueue(healthy.id).await.unwrap();

        wait_for_status(&h, broken.id, JobStatus::Failed).await;
        wait_for_status(&h, healthy.id, JobStatus::Done).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let h = Harness::new(FakeMode::WaitForCancel).await;
        let pool = pool_for(&h, 1);
        let job = h.pending_job(images(2)).await;
        pool.queue().enqueue(job.id).await.unwrap();

        h.encoder.started().await;
        assert!(matches!(
            pool.cancel(job.id).await.unwrap(),
            CancelOutcome::Signalled(JobStatus::Processing | JobStatus::Failed)
        ));

        let failed = wait_for_status(&h, job.id, JobStatus::Failed).await;
        assert_eq!(failed.error_message.as_deref(), Some("cancelled"));
        assert!(failed.video_path.is_none());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_queued_job_withdraws_it() {
        let h = Harness::new(FakeMode::WaitForCancel).await;
        let pool = pool_for(&h, 1);

        let busy = h.pending_job(images(1)).await;
        let waiting = h.pending_job(images(1)).await;
        pool.queue().enqueue(busy.id).await.unwrap();
        h.encoder.started().await;
        pool.queue().enqueue(waiting.id).await.unwrap();

        match pool.cancel(waiting.id).await.unwrap() {
            CancelOutcome::Withdrawn(job) => {
                assert_eq!(job.status, JobStatus::Failed);
                assert_eq!(job.error_message.as_deref(), Some("cancelled"));
            }
            other => panic!("expected withdrawn, got {:?}", other),
        }
        assert_eq!(h.encoder.calls(), 1);

        pool.cancel(busy.id).await.unwrap();
        wait_for_status(&h, busy.id, JobStatus::Failed).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_finished_job() {
        let h = Harness::new(FakeMode::Succeed).await;
        let pool = pool_for(&h, 1);
        let job = h.pending_job(images(1)).await;
        pool.queue().enqueue(job.id).await.unwrap();
        wait_for_status(&h, job.id, JobStatus::Done).await;

        assert_eq!(
            pool.cancel(job.id).await.unwrap(),
            CancelOutcome::AlreadyFinished(JobStatus::Done)
        );
        assert!(matches!(
            pool.cancel(JobId(999)).await,
            Err(WorkerError::NotFound(_))
        ));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_before_dequeue_is_honoured() {
        let h = Harness::new(FakeMode::WaitForCancel).await;
        let pool = pool_for(&h, 1);
        let job = h.pending_job(images(1)).await;

        // Not queued yet: the signal is parked for the worker.
        assert_eq!(
            pool.cancel(job.id).await.unwrap(),
            CancelOutcome::Signalled(JobStatus::Pending)
        );
        pool.queue().enqueue(job.id).await.unwrap();

        let failed = wait_for_status(&h, job.id, JobStatus::Failed).await;
        assert_eq!(failed.error_message.as_deref(), Some("cancelled"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_resume_requeues_pending_and_fails_orphans() {
        let h = Harness::new(FakeMode::Succeed).await;
        let orphan = h.pending_job(images(1)).await;
        let waiting = h.pending_job(images(1)).await;
        h.store
            .update_status(orphan.id, slidecast_db::StatusUpdate::processing())
            .await
            .unwrap();

        let pool = pool_for(&h, 1);
        assert_eq!(pool.resume().await.unwrap(), 1);

        wait_for_status(&h, waiting.id, JobStatus::Done).await;
        let orphan = h.store.get(orphan.id).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.error_message.as_deref(), Some("interrupted"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_leaves_backlog_pending() {
        let h = Harness::new(FakeMode::Slow(Duration::from_millis(100))).await;
        let pool = pool_for(&h, 1);

        let first = h.pending_job(images(1)).await;
        let second = h.pending_job(images(1)).await;
        pool.queue().enqueue(first.id).await.unwrap();
        h.encoder.started().await;
        pool.queue().enqueue(second.id).await.unwrap();

        pool.shutdown().await;

        assert_eq!(h.store.get(first.id).await.unwrap().status, JobStatus::Done);
        assert_eq!(h.store.get(second.id).await.unwrap().status, JobStatus::Pending);
        assert!(matches!(
            pool.queue().enqueue(second.id).await,
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_panicking_job_is_failed_and_worker_survives() {
        let h = Harness::new(FakeMode::Panic).await;
        let pool = pool_for(&h, 1);

        let first = h.pending_job(images(1)).await;
        let second = h.pending_job(images(1)).await;
        pool.queue().enqueue(first.id).await.unwrap();
        pool.queue().enqueue(second.id).await.unwrap();

        for id in [first.id, second.id] {
            let job = wait_for_status(&h, id, JobStatus::Failed).await;
            assert_eq!(job.error_message.as_deref(), Some("panicked"));
            assert!(job.video_path.is_none());
        }
        assert_eq!(h.encoder.calls(), 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_parked_signals_of_finished_jobs_are_dropped() {
        let h = Harness::new(FakeMode::Succeed).await;
        let pool = pool_for(&h, 1);

        // Neither job is queued, so both signals are parked.
        let finished = h.pending_job(images(1)).await;
        let waiting = h.pending_job(images(1)).await;
        pool.cancel(finished.id).await.unwrap();
        assert_eq!(pool.cancels.len().await, 1);

        h.orchestrator.reject(finished.id, &JobFailure::Cancelled).await.unwrap();
        assert_eq!(
            pool.cancel(waiting.id).await.unwrap(),
            CancelOutcome::Signalled(JobStatus::Pending)
        );
        assert_eq!(pool.cancels.len().await, 1);

        h.orchestrator.reject(waiting.id, &JobFailure::Cancelled).await.unwrap();
        pool.resume().await.unwrap();
        assert_eq!(pool.cancels.len().await, 0);
        pool.shutdown().await;
    }
}

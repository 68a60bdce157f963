//! FIFO job queue shared by submitters and workers.

use std::collections::{HashSet, VecDeque};

use metrics::gauge;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use slidecast_models::JobId;

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Maximum number of waiting jobs; `None` is unbounded
    pub capacity: Option<usize>,
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<JobId>,
    queued: HashSet<JobId>,
    closed: bool,
}

/// Job queue.
///
/// An id can be waiting at most once; it may be enqueued again after a worker
/// has taken it.
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<State>,
    notify: Notify,
    config: QueueConfig,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            config,
        }
    }

    /// Add a job to the back of the queue.
    pub async fn enqueue(&self, job_id: JobId) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }
        if state.queued.contains(&job_id) {
            return Err(QueueError::Duplicate(job_id));
        }
        if let Some(capacity) = self.config.capacity {
            if state.pending.len() >= capacity {
                return Err(QueueError::Full { capacity });
            }
        }

        state.queued.insert(job_id);
        state.pending.push_back(job_id);
        gauge!("slidecast_queue_depth").set(state.pending.len() as f64);
        drop(state);

        self.notify.notify_one();
        debug!(job_id = %job_id, "Enqueued job");
        Ok(())
    }

    /// Wait for the next job.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<JobId> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if let Some(job_id) = state.pending.pop_front() {
                    state.queued.remove(&job_id);
                    gauge!("slidecast_queue_depth").set(state.pending.len() as f64);
                    if !state.pending.is_empty() {
                        // Pass the wakeup on so idle workers pick up the rest.
                        self.notify.notify_one();
                    }
                    return Some(job_id);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take a job without waiting.
    pub async fn try_dequeue(&self) -> Option<JobId> {
        let mut state = self.state.lock().await;
        let job_id = state.pending.pop_front()?;
        state.queued.remove(&job_id);
        gauge!("slidecast_queue_depth").set(state.pending.len() as f64);
        Some(job_id)
    }

    /// Remove a waiting job. Returns whether it was queued.
    pub async fn remove(&self, job_id: JobId) -> bool {
        let mut state = self.state.lock().await;
        if !state.queued.remove(&job_id) {
            return false;
        }
        state.pending.retain(|id| *id != job_id);
        gauge!("slidecast_queue_depth").set(state.pending.len() as f64);
        true
    }

    /// Stop accepting jobs. Waiting jobs are still handed out.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.closed = true;
            info!(waiting = state.pending.len(), "Job queue closed");
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn contains(&self, job_id: JobId) -> bool {
        self.state.lock().await.queued.contains(&job_id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::default();
        for id in 1..=3 {
            queue.enqueue(JobId(id)).await.unwrap();
        }

        assert_eq!(queue.dequeue().await, Some(JobId(1)));
        assert_eq!(queue.dequeue().await, Some(JobId(2)));
        assert_eq!(queue.dequeue().await, Some(JobId(3)));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_suppressed_while_waiting() {
        let queue = JobQueue::default();
        queue.enqueue(JobId(1)).await.unwrap();

        assert!(matches!(
            queue.enqueue(JobId(1)).await,
            Err(QueueError::Duplicate(JobId(1)))
        ));
        assert_eq!(queue.len().await, 1);

        // Once taken, the id may be queued again
        assert_eq!(queue.dequeue().await, Some(JobId(1)));
        queue.enqueue(JobId(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_capacity() {
        let queue = JobQueue::new(QueueConfig { capacity: Some(1) });
        queue.enqueue(JobId(1)).await.unwrap();
        assert!(matches!(
            queue.enqueue(JobId(2)).await,
            Err(QueueError::Full { capacity: 1 })
        ));
    }

    #[tokio::test]
    async fn test_remove() {
        let queue = JobQueue::default();
        queue.enqueue(JobId(1)).await.unwrap();
        queue.enqueue(JobId(2)).await.unwrap();

        assert!(queue.remove(JobId(1)).await);
        assert!(!queue.remove(JobId(1)).await);
        assert!(!queue.contains(JobId(1)).await);
        assert_eq!(queue.try_dequeue().await, Some(JobId(2)));
        assert_eq!(queue.try_dequeue().await, None);
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(JobQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(JobId(7)).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Some(JobId(7)));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = Arc::new(JobQueue::default());
        queue.enqueue(JobId(1)).await.unwrap();

        let idle = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let first = queue.dequeue().await;
                let second = queue.dequeue().await;
                (first, second)
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;

        let (first, second) = tokio::time::timeout(Duration::from_secs(1), idle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, Some(JobId(1)));
        assert_eq!(second, None);
        assert!(matches!(queue.enqueue(JobId(2)).await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn test_many_consumers_each_job_once() {
        let queue = Arc::new(JobQueue::default());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut taken = Vec::new();
                    while let Some(id) = queue.dequeue().await {
                        taken.push(id);
                    }
                    taken
                })
            })
            .collect();

        for id in 0..50 {
            queue.enqueue(JobId(id)).await.unwrap();
        }
        queue.close().await;

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..50).map(JobId).collect::<Vec<_>>());
    }
}

//! In-memory job store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use slidecast_models::{Job, JobId, JobStatus, NewJob};

use crate::error::{DbError, DbResult};
use crate::store::{check_update, JobStore, StatusUpdate};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    jobs: BTreeMap<JobId, Job>,
}

/// A [`JobStore`] holding records in process memory.
///
/// Transition checks and writes happen under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> DbResult<Job> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = JobId(inner.next_id);
        let job = Job::pending(id, new_job, Utc::now());
        inner.jobs.insert(id, job.clone());
        debug!(job_id = %id, "Created job");
        Ok(job)
    }

    async fn get(&self, id: JobId) -> DbResult<Job> {
        self.inner
            .read()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or(DbError::NotFound(id))
    }

    async fn update_status(&self, id: JobId, update: StatusUpdate) -> DbResult<Job> {
        let mut inner = self.inner.write().await;
        let current = inner.jobs.get(&id).ok_or(DbError::NotFound(id))?;
        check_update(current, &update)?;

        let updated = update.apply(current, Utc::now());
        inner.jobs.insert(id, updated.clone());
        debug!(job_id = %id, status = %updated.status, "Updated job status");
        Ok(updated)
    }

    async fn list_by_status(&self, status: JobStatus) -> DbResult<Vec<Job>> {
        Ok(self
            .inner
            .read()
            .await
            .jobs
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }
}

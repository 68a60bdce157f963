//! Lookup of finished videos.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use slidecast_db::JobStore;
use slidecast_models::{JobId, JobStatus};

use crate::config::StorageConfig;
use crate::error::AssetError;

/// Resolves a job id to its encoded video on disk. Read-only.
#[derive(Clone)]
pub struct VideoAssetStore {
    store: Arc<dyn JobStore>,
    config: StorageConfig,
}

impl VideoAssetStore {
    pub fn new(store: Arc<dyn JobStore>, config: StorageConfig) -> Self {
        Self { store, config }
    }

    /// Filesystem path of `job_id`'s video.
    ///
    /// Only `done` jobs resolve. Pending and processing jobs are
    /// [`AssetError::NotReady`] and failed jobs [`AssetError::NotAvailable`].
    pub async fn resolve(&self, job_id: JobId) -> Result<PathBuf, AssetError> {
        let job = self.store.get(job_id).await?;

        match job.status {
            JobStatus::Done => {
                let path = self.config.video_path(job_id);
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    warn!(job_id = %job_id, "Done job has no video at {}", path.display());
                    return Err(AssetError::Missing { id: job_id, path });
                }
                Ok(path)
            }
            JobStatus::Pending | JobStatus::Processing => Err(AssetError::NotReady {
                id: job_id,
                status: job.status,
            }),
            JobStatus::Failed => Err(AssetError::NotAvailable(job_id)),
        }
    }
}

/// Parse a published file name (`job_{id}.mp4`) back into its job id.
pub fn parse_public_name(name: &str) -> Option<JobId> {
    let digits = name.strip_prefix("job_")?.strip_suffix(".mp4")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(JobId)
}

//! Storage layout configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use slidecast_models::JobId;

/// URL prefix under which encoded videos are published.
pub const PUBLIC_VIDEO_PREFIX: &str = "/videos";

/// Where uploads and encoded videos live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the per-job upload directories
    pub upload_dir: PathBuf,
    /// Directory holding encoded videos
    pub video_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("storage/uploads"),
            video_dir: PathBuf::from("storage/videos"),
        }
    }
}

impl StorageConfig {
    pub fn new(upload_dir: impl Into<PathBuf>, video_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            video_dir: video_dir.into(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            video_dir: std::env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.video_dir),
        }
    }

    /// Upload directory owned by one job.
    pub fn job_upload_dir(&self, job_id: JobId) -> PathBuf {
        self.upload_dir.join(job_id.dir_name())
    }

    /// Filesystem location of a job's encoded video.
    pub fn video_path(&self, job_id: JobId) -> PathBuf {
        self.video_dir.join(job_id.video_file_name())
    }

    /// Public reference stored on a finished job (`/videos/job_{id}.mp4`).
    pub fn public_video_path(job_id: JobId) -> String {
        format!("{}/{}", PUBLIC_VIDEO_PREFIX, job_id.video_file_name())
    }

    /// Create the upload and video roots.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.video_dir).await?;
        Ok(())
    }
}

//! Upload intake.
//!
//! Materializes a job's uploaded images into its own directory, one file per
//! image named after its position, and reads them back in playback order.

use std::path::PathBuf;

use tracing::{debug, info};

use slidecast_models::{ImageAsset, JobId};

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// One uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Client-supplied file name, only used for its extension
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Writes and reads per-job image sets.
#[derive(Debug, Clone)]
pub struct UploadIntake {
    config: StorageConfig,
}

impl UploadIntake {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Directory holding `job_id`'s images.
    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.config.job_upload_dir(job_id)
    }

    /// Write `images` for `job_id`, in order, and return their assets.
    ///
    /// The image at position `i` becomes `image_{i}.{ext}`. An empty input is
    /// rejected before anything touches the disk. On a write error the files
    /// already written are left behind and the job must not be encoded.
    pub async fn materialize(
        &self,
        job_id: JobId,
        images: Vec<UploadedImage>,
    ) -> StorageResult<Vec<ImageAsset>> {
        if images.is_empty() {
            return Err(StorageError::validation(format!(
                "job {} has no images",
                job_id
            )));
        }

        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut assets = Vec::with_capacity(images.len());
        for (position, image) in images.into_iter().enumerate() {
            let sequence_index = u32::try_from(position)
                .map_err(|_| StorageError::validation("too many images"))?;
            let extension = ImageAsset::normalize_extension(&image.filename);
            let path = dir.join(ImageAsset::file_name(sequence_index, &extension));

            tokio::fs::write(&path, &image.bytes).await?;
            debug!(
                job_id = %job_id,
                sequence_index,
                bytes = image.bytes.len(),
                "Stored image {}",
                path.display()
            );

            assets.push(ImageAsset {
                job_id,
                sequence_index,
                path,
                extension,
            });
        }

        info!(job_id = %job_id, images = assets.len(), "Materialized uploads");
        Ok(assets)
    }

    /// Read back the slideshow sources stored for `job_id`.
    ///
    /// Only `jpg`, `jpeg`, `png` and `gif` files qualify. Images are ordered by
    /// their numeric sequence index, so `image_10` follows `image_9`.
    pub async fn scan(&self, job_id: JobId) -> StorageResult<Vec<ImageAsset>> {
        let dir = self.job_dir(job_id);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::SourceNotFound(dir));
            }
            Err(e) => return Err(e.into()),
        };

        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some((sequence_index, extension)) = name.to_str().and_then(ImageAsset::parse_file_name)
            else {
                continue;
            };

            let asset = ImageAsset {
                job_id,
                sequence_index,
                path: entry.path(),
                extension,
            };
            if asset.is_supported() {
                assets.push(asset);
            } else {
                debug!(job_id = %job_id, "Skipping non-image upload {}", asset.path.display());
            }
        }

        if assets.is_empty() {
            return Err(StorageError::validation(format!(
                "no supported images found for job {}",
                job_id
            )));
        }

        assets.sort_by_key(|asset| asset.sequence_index);
        Ok(assets)
    }
}

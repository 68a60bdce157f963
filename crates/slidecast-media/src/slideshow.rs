//! Slideshow encoding.
//!
//! Each image is rendered into its own H.264 segment holding exactly
//! `round(seconds_per_image * fps)` frames on a fixed canvas. Segments share
//! codec parameters, so they are joined with the concat demuxer without
//! re-encoding. Cancellation is checked before every segment and also kills
//! a running FFmpeg process.
//!
//! All intermediates live in a per-encode scratch directory that is removed
//! when the encode returns, whatever the outcome.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use slidecast_models::{EncodingConfig, ImageAsset, JobId, VideoAsset};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::publish_file;

/// Name of the concat list written into the scratch directory.
const CONCAT_LIST_NAME: &str = "segments.txt";

/// Name of the joined output before it is published.
const STAGED_OUTPUT_NAME: &str = "slideshow.mp4";

/// Everything the encoder needs for one job.
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub job_id: JobId,
    /// Images in playback order
    pub images: Vec<ImageAsset>,
    /// Final location of the MP4
    pub output_path: PathBuf,
}

/// Turns an ordered set of images into a slideshow video.
#[async_trait]
pub trait SlideshowEncoder: Send + Sync {
    /// Encode `request.images` into `request.output_path`.
    ///
    /// Returns [`MediaError::Cancelled`] once `cancel` carries `true`. Nothing is
    /// written to the output path unless the whole encode succeeds.
    async fn encode(
        &self,
        request: &EncodeRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<VideoAsset>;
}

/// [`SlideshowEncoder`] backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegSlideshowEncoder {
    config: EncodingConfig,
    work_dir: PathBuf,
}

impl FfmpegSlideshowEncoder {
    /// Create an encoder that stages intermediates under `work_dir`.
    pub fn new(config: EncodingConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
        }
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    /// Scale into the canvas preserving aspect ratio, then letterbox.
    fn canvas_filter(&self) -> String {
        let EncodingConfig {
            width,
            height,
            pixel_format,
            ..
        } = &self.config;
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,format={pix}",
            w = width,
            h = height,
            pix = pixel_format
        )
    }

    /// Command rendering one image into a fixed-length segment.
    fn segment_command(&self, image: &Path, segment: &Path) -> FfmpegCommand {
        FfmpegCommand::new(image, segment)
            .looped_still(self.config.fps)
            .frame_limit(self.config.frames_per_image())
            .video_filter(self.canvas_filter())
            .video_codec(&self.config.codec)
            .preset(&self.config.preset)
            .crf(self.config.crf)
            .pixel_format(&self.config.pixel_format)
            .frame_rate(self.config.fps)
            .no_audio()
    }

    /// Command joining all segments into one MP4 without re-encoding.
    fn concat_command(&self, list: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(list, output)
            .concat_list()
            .stream_copy()
            .no_audio()
            .faststart()
    }

    fn check_request(&self, request: &EncodeRequest) -> MediaResult<()> {
        self.config
            .validate()
            .map_err(|e| MediaError::validation(e.to_string()))?;

        if request.images.is_empty() {
            return Err(MediaError::validation(format!(
                "no images to encode for job {}",
                request.job_id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SlideshowEncoder for FfmpegSlideshowEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<VideoAsset> {
        self.check_request(request)?;

        for image in &request.images {
            if !tokio::fs::try_exists(&image.path).await.unwrap_or(false) {
                return Err(MediaError::SourceNotFound(image.path.clone()));
            }
        }

        let started = Instant::now();
        let frames_per_image = self.config.frames_per_image();
        info!(
            job_id = %request.job_id,
            images = request.images.len(),
            frames_per_image,
            fps = self.config.fps,
            "Encoding slideshow"
        );

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", request.job_id.dir_name()))
            .tempdir_in(&self.work_dir)?;

        let mut segment_names = Vec::with_capacity(request.images.len());
        for (position, image) in request.images.iter().enumerate() {
            if *cancel.borrow() {
                return Err(MediaError::Cancelled);
            }

            let name = segment_file_name(position);
            let segment = scratch.path().join(&name);
            let cmd = self.segment_command(&image.path, &segment);

            let job_id = request.job_id;
            let sequence_index = image.sequence_index;
            FfmpegRunner::new()
                .with_cancel(cancel.clone())
                .run_with_progress(&cmd, move |progress| {
                    trace!(
                        job_id = %job_id,
                        sequence_index,
                        percent = progress.frame_percentage(frames_per_image),
                        "Segment progress"
                    );
                })
                .await?;

            debug!(job_id = %request.job_id, sequence_index, "Rendered segment {}", name);
            segment_names.push(name);
        }

        if *cancel.borrow() {
            return Err(MediaError::Cancelled);
        }

        let list = scratch.path().join(CONCAT_LIST_NAME);
        tokio::fs::write(&list, concat_list(&segment_names)).await?;

        let staged = scratch.path().join(STAGED_OUTPUT_NAME);
        FfmpegRunner::new()
            .with_cancel(cancel.clone())
            .run(&self.concat_command(&list, &staged))
            .await?;

        publish_file(&staged, &request.output_path).await?;

        let asset = VideoAsset::for_slideshow(
            request.job_id,
            &request.output_path,
            request.images.len(),
            self.config.seconds_per_image,
            self.config.fps,
        );

        info!(
            job_id = %request.job_id,
            duration_secs = asset.duration_secs,
            frame_count = asset.frame_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Slideshow encoded to {}",
            asset.path.display()
        );

        Ok(asset)
    }
}

/// Segment names sort in playback order and are relative to the concat list.
fn segment_file_name(position: usize) -> String {
    format!("segment_{:05}.mp4", position)
}

/// Concat demuxer list; entries are resolved relative to the list file.
fn concat_list(segment_names: &[String]) -> String {
    segment_names
        .iter()
        .map(|name| format!("file '{}'\n", name.replace('\'', r"'\''")))
        .collect()
}

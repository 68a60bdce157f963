//! Encoded slideshow artifacts.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Number of frames each image is held for: `round(seconds_per_image * fps)`.
pub fn frames_per_image(seconds_per_image: f64, fps: u32) -> u64 {
    let frames = (seconds_per_image * f64::from(fps)).round();
    if frames.is_finite() && frames > 0.0 {
        frames as u64
    } else {
        0
    }
}

/// The encoder's output for a job. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoAsset {
    pub job_id: JobId,
    /// Location of the MP4 on disk
    pub path: PathBuf,
    /// Total duration in seconds (`images * seconds_per_image`)
    pub duration_secs: f64,
    /// Total frames (`images * round(seconds_per_image * fps)`)
    pub frame_count: u64,
}

impl VideoAsset {
    /// Describe the slideshow produced from `image_count` images.
    pub fn for_slideshow(
        job_id: JobId,
        path: impl Into<PathBuf>,
        image_count: usize,
        seconds_per_image: f64,
        fps: u32,
    ) -> Self {
        Self {
            job_id,
            path: path.into(),
            duration_secs: image_count as f64 * seconds_per_image,
            frame_count: image_count as u64 * frames_per_image(seconds_per_image, fps),
        }
    }
}

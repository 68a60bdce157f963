//! Slideshow encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::video::frames_per_image;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default pixel format, playable by browsers and phones
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Default seconds each image stays on screen
pub const DEFAULT_SECONDS_PER_IMAGE: f64 = 2.0;
/// Default output frame rate
pub const DEFAULT_FPS: u32 = 24;
/// Default output canvas
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Rejected slideshow timing or canvas parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingConfigError {
    #[error("seconds per image must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("fps must be positive")]
    ZeroFps,

    #[error("{seconds_per_image}s at {fps} fps rounds to zero frames per image")]
    ZeroFrames { seconds_per_image: f64, fps: u32 },

    #[error("canvas {width}x{height} must be non-zero and even")]
    InvalidCanvas { width: u32, height: u32 },
}

/// Slideshow encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// How long each image is shown, in seconds
    #[serde(default = "default_seconds_per_image")]
    pub seconds_per_image: f64,

    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Output width in pixels (images are scaled and letterboxed to fit)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Output height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Output pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
}

fn default_seconds_per_image() -> f64 {
    DEFAULT_SECONDS_PER_IMAGE
}
fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_width() -> u32 {
    DEFAULT_WIDTH
}
fn default_height() -> u32 {
    DEFAULT_HEIGHT
}
fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            seconds_per_image: DEFAULT_SECONDS_PER_IMAGE,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
        }
    }
}

impl EncodingConfig {
    /// Create a new encoding configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            seconds_per_image: env_parse("SLIDESHOW_SECONDS_PER_IMAGE")
                .unwrap_or(defaults.seconds_per_image),
            fps: env_parse("SLIDESHOW_FPS").unwrap_or(defaults.fps),
            width: env_parse("SLIDESHOW_WIDTH").unwrap_or(defaults.width),
            height: env_parse("SLIDESHOW_HEIGHT").unwrap_or(defaults.height),
            codec: std::env::var("SLIDESHOW_CODEC").unwrap_or(defaults.codec),
            preset: std::env::var("SLIDESHOW_PRESET").unwrap_or(defaults.preset),
            crf: env_parse("SLIDESHOW_CRF").unwrap_or(defaults.crf),
            pixel_format: defaults.pixel_format,
        }
    }

    /// Returns a new config with updated timing.
    pub fn with_timing(mut self, seconds_per_image: f64, fps: u32) -> Self {
        self.seconds_per_image = seconds_per_image;
        self.fps = fps;
        self
    }

    /// Returns a new config with an updated output canvas.
    pub fn with_canvas(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Frames each image is held for.
    pub fn frames_per_image(&self) -> u64 {
        frames_per_image(self.seconds_per_image, self.fps)
    }

    /// Check the encoder preconditions on timing and canvas.
    pub fn validate(&self) -> Result<(), EncodingConfigError> {
        if !(self.seconds_per_image > 0.0) || !self.seconds_per_image.is_finite() {
            return Err(EncodingConfigError::NonPositiveDuration(self.seconds_per_image));
        }
        if self.fps == 0 {
            return Err(EncodingConfigError::ZeroFps);
        }
        if self.frames_per_image() == 0 {
            return Err(EncodingConfigError::ZeroFrames {
                seconds_per_image: self.seconds_per_image,
                fps: self.fps,
            });
        }
        // libx264 with yuv420p requires even dimensions
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(EncodingConfigError::InvalidCanvas {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EncodingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_per_image(), 48);
        assert_eq!(config.codec, "libx264");
    }

    #[test]
    fn test_rejects_bad_timing() {
        assert_eq!(
            EncodingConfig::new().with_timing(0.0, 24).validate(),
            Err(EncodingConfigError::NonPositiveDuration(0.0))
        );
        assert_eq!(
            EncodingConfig::new().with_timing(2.0, 0).validate(),
            Err(EncodingConfigError::ZeroFps)
        );
        assert!(matches!(
            EncodingConfig::new().with_timing(0.01, 24).validate(),
            Err(EncodingConfigError::ZeroFrames { .. })
        ));
        assert!(EncodingConfig::new().with_timing(f64::NAN, 24).validate().is_err());
    }

    #[test]
    fn test_rejects_odd_canvas() {
        assert!(matches!(
            EncodingConfig::new().with_canvas(1279, 720).validate(),
            Err(EncodingConfigError::InvalidCanvas { .. })
        ));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: EncodingConfig = serde_json::from_str(r#"{"fps": 30}"#).unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.seconds_per_image, DEFAULT_SECONDS_PER_IMAGE);
        assert_eq!(config.preset, DEFAULT_PRESET);
    }
}

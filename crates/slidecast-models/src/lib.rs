//! Shared data models for the Slidecast backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their identifiers and lifecycle states
//! - Uploaded images and their sequence positions
//! - Encoded slideshow artifacts
//! - Encoding configuration

pub mod encoding;
pub mod image;
pub mod job;
pub mod video;

// Re-export common types
pub use encoding::{EncodingConfig, EncodingConfigError};
pub use image::{is_supported_extension, ImageAsset, SUPPORTED_IMAGE_EXTENSIONS};
pub use job::{Job, JobId, JobStatus, NewJob, ParseJobStatusError};
pub use video::{frames_per_image, VideoAsset};

//! Local filesystem storage for slideshow jobs.
//!
//! This crate provides:
//! - The on-disk layout (`uploads/job_{id}/image_{n}.{ext}`, `videos/job_{id}.mp4`)
//! - Upload intake: writing and reading back a job's ordered images
//! - Video asset lookup for finished jobs

pub mod assets;
pub mod config;
pub mod error;
pub mod intake;

pub use assets::{parse_public_name, VideoAssetStore};
pub use config::StorageConfig;
pub use error::{AssetError, StorageError, StorageResult};
pub use intake::{UploadIntake, UploadedImage};

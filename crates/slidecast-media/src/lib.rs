//! FFmpeg CLI wrapper for slideshow encoding.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation support via a tokio watch channel
//! - The slideshow encoder (per-image segments joined with the concat demuxer)
//! - FFprobe inspection of encoded output

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod slideshow;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use slideshow::{EncodeRequest, FfmpegSlideshowEncoder, SlideshowEncoder};

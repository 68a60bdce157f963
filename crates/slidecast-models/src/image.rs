//! Uploaded images and their position within a slideshow.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Extensions accepted as slideshow sources (compared case-insensitively).
pub const SUPPORTED_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Extension used when the client filename carries none.
pub const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

/// Stem prefix of stored image files (`image_{index}.{ext}`).
const IMAGE_FILE_PREFIX: &str = "image_";

/// An image file plus its ordinal position within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImageAsset {
    /// Owning job (back-reference)
    pub job_id: JobId,
    /// 0-based position in the slideshow
    pub sequence_index: u32,
    /// Location on disk
    pub path: PathBuf,
    /// Lowercase extension without the dot
    pub extension: String,
}

impl ImageAsset {
    /// Stored file name for an image at `sequence_index`.
    pub fn file_name(sequence_index: u32, extension: &str) -> String {
        format!("{}{}.{}", IMAGE_FILE_PREFIX, sequence_index, extension)
    }

    /// Derive the normalized extension from a client-supplied filename.
    ///
    /// Falls back to `jpg` when the name has no extension or the extension is
    /// not plain ASCII alphanumerics.
    pub fn normalize_extension(filename: &str) -> String {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
    }

    /// Parse a stored file name back into `(sequence_index, extension)`.
    ///
    /// Returns `None` for names not produced by [`ImageAsset::file_name`].
    pub fn parse_file_name(name: &str) -> Option<(u32, String)> {
        let (stem, extension) = name.rsplit_once('.')?;
        let index = stem.strip_prefix(IMAGE_FILE_PREFIX)?;
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some((index.parse().ok()?, extension.to_ascii_lowercase()))
    }

    /// Whether this image has an extension the encoder accepts.
    pub fn is_supported(&self) -> bool {
        is_supported_extension(&self.extension)
    }
}

/// Whether `extension` (with or without a leading dot) is a slideshow source.
pub fn is_supported_extension(extension: &str) -> bool {
    let ext = extension.trim_start_matches('.');
    SUPPORTED_IMAGE_EXTENSIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(ext))
}

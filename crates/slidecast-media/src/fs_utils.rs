//! Filesystem helpers for publishing encoder output.
//!
//! Encodes are staged in a scratch directory that may live on a different
//! filesystem than the video directory, so publishing must survive EXDEV.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a finished file from `src` to `dst`, replacing any previous file.
///
/// Tries a rename first. On a cross-device error it copies into a sibling
/// temporary file next to `dst` and renames that into place, so readers of
/// `dst` never observe a partially written file.
pub async fn publish_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device publish, copying instead of renaming"
            );
            copy_into_place(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// EXDEV (cross-device link) is errno 18 on Linux and macOS.
fn is_cross_device_error(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(18)
}

async fn copy_into_place(src: &Path, dst: &Path) -> MediaResult<()> {
    let staging = dst.with_extension("partial");

    if let Err(e) = fs::copy(src, &staging).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(src = %src.display(), "Failed to remove staged file after publish: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_publish_creates_parent_and_moves() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staged.mp4");
        let dst = dir.path().join("videos").join("job_1.mp4");

        fs::write(&src, b"mp4 bytes").await.unwrap();
        publish_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"mp4 bytes");
    }

    #[tokio::test]
    async fn test_publish_replaces_previous_output() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staged.mp4");
        let dst = dir.path().join("job_1.mp4");

        fs::write(&dst, b"old").await.unwrap();
        fs::write(&src, b"new").await.unwrap();
        publish_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_copy_into_place_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staged.mp4");
        let dst = dir.path().join("job_2.mp4");

        fs::write(&src, b"frames").await.unwrap();
        copy_into_place(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(!dir.path().join("job_2.partial").exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[test]
    fn test_is_cross_device_error() {
        assert!(is_cross_device_error(&std::io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device_error(&std::io::Error::from_raw_os_error(2)));
    }
}

//! Verifies runtime prerequisites before starting the service.

use std::path::Path;

use slidecast_db::{DbConfig, SqliteJobStore};
use slidecast_media::{check_ffmpeg, check_ffprobe};
use slidecast_models::EncodingConfig;
use slidecast_storage::StorageConfig;
use slidecast_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let worker = WorkerConfig::from_env();
    let storage = StorageConfig::from_env();
    let encoding = EncodingConfig::from_env();
    let db = DbConfig::from_env();

    println!(
        "slidecast-selfcheck: starting with work_dir={}",
        worker.work_dir.display()
    );

    encoding
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid encoding settings: {}", e))?;

    let ffmpeg = check_ffmpeg()?;
    println!("slidecast-selfcheck: ffmpeg at {}", ffmpeg.display());
    check_ffprobe()?;

    ensure_writable(&worker.work_dir).await?;
    ensure_writable(&storage.upload_dir).await?;
    ensure_writable(&storage.video_dir).await?;

    let store = SqliteJobStore::connect(&db).await?;
    store.ping().await?;
    store.close().await;

    println!("slidecast-selfcheck: ok");
    Ok(())
}

async fn ensure_writable(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

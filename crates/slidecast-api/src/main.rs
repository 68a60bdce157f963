//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slidecast_api::{create_router, metrics, ApiConfig, AppState};
use slidecast_db::{DbConfig, JobStore, SqliteJobStore};
use slidecast_media::{check_ffmpeg, FfmpegSlideshowEncoder, SlideshowEncoder};
use slidecast_models::EncodingConfig;
use slidecast_queue::QueueConfig;
use slidecast_storage::StorageConfig;
use slidecast_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("slidecast=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting slidecast-api");

    // Load configuration
    let config = ApiConfig::from_env();
    let storage = StorageConfig::from_env();
    let encoding = EncodingConfig::from_env();
    let worker = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, workers={}",
        config.host, config.port, worker.max_concurrent_jobs
    );

    encoding.validate().context("invalid slideshow settings")?;
    if let Err(e) = check_ffmpeg() {
        warn!("FFmpeg not available, jobs will fail until it is installed: {}", e);
    }

    storage
        .ensure_dirs()
        .await
        .context("failed to create storage directories")?;

    let db = SqliteJobStore::connect(&DbConfig::from_env())
        .await
        .context("failed to open job store")?;
    let db = Arc::new(db);
    let store: Arc<dyn JobStore> = db.clone();

    let encoder: Arc<dyn SlideshowEncoder> =
        Arc::new(FfmpegSlideshowEncoder::new(encoding, worker.work_dir.clone()));

    let state = AppState::new(
        config.clone(),
        store,
        storage,
        encoder,
        worker,
        QueueConfig::from_env(),
    );

    let resumed = state.pool.resume().await.context("failed to resume jobs")?;
    if resumed > 0 {
        info!(resumed, "Re-queued pending jobs from a previous run");
    }

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let pool = Arc::clone(&state.pool);
    let app = create_router(state, metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

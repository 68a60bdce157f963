//! Test doubles shared by the worker tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{watch, Notify};

use slidecast_db::{InMemoryJobStore, JobStore};
use slidecast_media::{EncodeRequest, MediaError, MediaResult, SlideshowEncoder};
use slidecast_models::{Job, NewJob, VideoAsset};
use slidecast_storage::{StorageConfig, UploadIntake, UploadedImage};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy)]
pub enum FakeMode {
    /// Write the concatenated image bytes to the output path
    Succeed,
    /// Fail as if FFmpeg exited non-zero
    FailEncoding,
    /// Block until cancelled
    WaitForCancel,
    /// Succeed after a delay
    Slow(Duration),
    /// Panic inside the encoder
    Panic,
}

/// Encoder that never runs FFmpeg.
pub struct FakeEncoder {
    mode: FakeMode,
    calls: AtomicUsize,
    started: Notify,
}

impl FakeEncoder {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once an encode has begun.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    async fn write_output(request: &EncodeRequest) -> MediaResult<VideoAsset> {
        let mut bytes = Vec::new();
        for image in &request.images {
            bytes.extend(tokio::fs::read(&image.path).await?);
        }
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, bytes).await?;

        Ok(VideoAsset::for_slideshow(
            request.job_id,
            &request.output_path,
            request.images.len(),
            2.0,
            24,
        ))
    }
}

#[async_trait]
impl SlideshowEncoder for FakeEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        mut cancel: watch::Receiver<bool>,
    ) -> MediaResult<VideoAsset> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        match self.mode {
            FakeMode::Succeed => Self::write_output(request).await,
            FakeMode::FailEncoding => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some("image_1.png: Invalid data found when processing input".into()),
                Some(1),
            )),
            FakeMode::WaitForCancel => loop {
                if *cancel.borrow_and_update() {
                    return Err(MediaError::Cancelled);
                }
                if cancel.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            },
            FakeMode::Panic => panic!("encoder blew up"),
            FakeMode::Slow(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Self::write_output(request).await,
                    _ = async {
                        while !*cancel.borrow_and_update() {
                            if cancel.changed().await.is_err() {
                                std::future::pending::<()>().await;
                            }
                        }
                    } => Err(MediaError::Cancelled),
                }
            }
        }
    }
}

/// A store, intake and orchestrator rooted in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<dyn JobStore>,
    pub storage: StorageConfig,
    pub intake: UploadIntake,
    pub encoder: Arc<FakeEncoder>,
    pub orchestrator: Arc<Orchestrator>,
    never_cancel: watch::Sender<bool>,
}

impl Harness {
    pub async fn new(mode: FakeMode) -> Self {
        Self::with_store(mode, Arc::new(InMemoryJobStore::new())).await
    }

    pub async fn with_store(mode: FakeMode, store: Arc<dyn JobStore>) -> Self {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig::new(dir.path().join("uploads"), dir.path().join("videos"));
        storage.ensure_dirs().await.unwrap();

        let intake = UploadIntake::new(storage.clone());
        let encoder = Arc::new(FakeEncoder::new(mode));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            intake.clone(),
            encoder.clone(),
        ));
        let (never_cancel, _) = watch::channel(false);

        Self {
            dir,
            store,
            storage,
            intake,
            encoder,
            orchestrator,
            never_cancel,
        }
    }

    /// A cancel receiver that never fires.
    pub fn no_cancel(&self) -> watch::Receiver<bool> {
        self.never_cancel.subscribe()
    }

    /// Create a pending job and materialize its uploads.
    pub async fn pending_job(&self, images: Vec<UploadedImage>) -> Job {
        let job = self.store.create(NewJob::new("Holiday", "Day one")).await.unwrap();
        self.intake.materialize(job.id, images).await.unwrap();
        job
    }
}

//! Application state.

use std::sync::Arc;

use slidecast_db::JobStore;
use slidecast_media::SlideshowEncoder;
use slidecast_queue::{JobQueue, QueueConfig};
use slidecast_storage::{StorageConfig, UploadIntake, VideoAssetStore};
use slidecast_worker::{JobService, Orchestrator, WorkerConfig, WorkerPool};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub jobs: JobService,
    pub pool: Arc<WorkerPool>,
    pub assets: VideoAssetStore,
}

impl AppState {
    /// Wire the pipeline together and start the worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        storage: StorageConfig,
        encoder: Arc<dyn SlideshowEncoder>,
        worker: WorkerConfig,
        queue: QueueConfig,
    ) -> Self {
        let intake = UploadIntake::new(storage.clone());
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&store), intake, encoder));
        let queue = Arc::new(JobQueue::new(queue));

        let pool = Arc::new(WorkerPool::start(
            worker,
            Arc::clone(&queue),
            Arc::clone(&orchestrator),
        ));
        let jobs = JobService::new(orchestrator, queue);
        let assets = VideoAssetStore::new(Arc::clone(&store), storage);

        Self {
            config,
            store,
            jobs,
            pool,
            assets,
        }
    }
}

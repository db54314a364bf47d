//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::events::Broadcaster;
use crate::jobs::JobExecutor;
use crate::ocr::{Extractor, InferenceEngine, OllamaEngine};
use crate::pdf::{MuPdfRasterizer, Rasterizer};
use crate::queue::JobQueue;
use crate::storage::{FileStore, JobStore, JsonJobStore, StoreError};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to open job store: {0}")]
    JobStore(#[from] StoreError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn JobStore>,
    files: FileStore,
    engine: Arc<dyn InferenceEngine>,
    rasterizer: Arc<dyn Rasterizer>,
    broadcaster: Broadcaster,
    queue: JobQueue,
}

impl AppState {
    /// Create the state with the Ollama engine and the MuPDF rasterizer
    pub async fn new(config: Config) -> Result<Self, StateError> {
        let store = Arc::new(JsonJobStore::open(&config.storage.output_dir).await?);
        let engine = Arc::new(OllamaEngine::new(config.ocr.clone()));
        let rasterizer = Arc::new(MuPdfRasterizer::new(config.pdf.render_dpi));

        Ok(Self::with_components(config, store, engine, rasterizer))
    }

    /// Create the state around the given collaborators
    pub fn with_components(
        config: Config,
        store: Arc<dyn JobStore>,
        engine: Arc<dyn InferenceEngine>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        let files = FileStore::new(&config.storage.output_dir);
        let broadcaster = Broadcaster::new();

        let executor = JobExecutor::new(
            store.clone(),
            files.clone(),
            Extractor::new(engine.clone()),
            rasterizer.clone(),
            broadcaster.clone(),
            &config.ocr.default_device,
        );
        let queue = JobQueue::new(executor, store.clone(), broadcaster.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                files,
                engine,
                rasterizer,
                broadcaster,
                queue,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the job store
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Get the upload/result file layout
    pub fn files(&self) -> &FileStore {
        &self.inner.files
    }

    /// Get the inference engine
    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.inner.engine
    }

    /// Get the PDF rasterizer
    pub fn rasterizer(&self) -> &Arc<dyn Rasterizer> {
        &self.inner.rasterizer
    }

    /// Get the push-channel broadcaster
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    /// Get the job queue
    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }
}

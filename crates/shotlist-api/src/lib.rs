//! # shotlist-api
//!
//! HTTP surface of the shotlist system: asset upload and lifecycle, recall
//! and candidate-cache operations, and feedback recording. Handlers stay
//! thin; all semantics live in the library crates.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use std::sync::Arc;

use shotlist_inference::{EmbeddingBackend, TranscriptionBackend};
use shotlist_jobs::stages::{EmbeddingStage, ProxyStage, TranscriptStage};
use shotlist_jobs::{IngestPipeline, IngestWorker, PipelineConfig, WorkerConfig, WorkerHandle};
use shotlist_rank::{CandidateCache, RankConfig, RankingEngine};
use shotlist_store::{FeedbackEngine, InMemoryAssetStore, InMemoryBlobStore, InMemoryTaskStore, TrustConfig};

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;

/// Wire the stores, engines, pipeline and worker around the given inference
/// backends. Tunables come from the environment. The worker is started; the
/// returned handle controls its shutdown.
pub fn bootstrap(
    embedder: Arc<dyn EmbeddingBackend>,
    transcriber: Option<Arc<dyn TranscriptionBackend>>,
    worker_config: WorkerConfig,
) -> (AppState, WorkerHandle) {
    let assets = Arc::new(InMemoryAssetStore::new());
    let tasks = Arc::new(InMemoryTaskStore::new());
    let blobs = InMemoryBlobStore::new();

    let feedback = Arc::new(FeedbackEngine::new(assets.clone(), TrustConfig::from_env()));
    let engine = Arc::new(RankingEngine::new(
        assets.clone(),
        embedder.clone(),
        RankConfig::from_env(),
    ));
    let cache = Arc::new(CandidateCache::from_env());

    let pipeline = IngestPipeline::new(assets.clone(), tasks.clone(), PipelineConfig::from_env())
        .register(ProxyStage::new(assets.clone()))
        .register(TranscriptStage::new(assets.clone(), transcriber))
        .register(EmbeddingStage::new(assets.clone(), embedder));

    let worker = IngestWorker::new(Arc::new(pipeline), worker_config);
    let queue = worker.queue();
    let handle = worker.start();

    let state = AppState {
        assets,
        tasks,
        blobs,
        feedback,
        engine,
        cache,
        queue,
    };
    (state, handle)
}

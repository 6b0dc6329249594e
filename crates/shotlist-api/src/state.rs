//! Shared application state.

use std::sync::Arc;

use shotlist_jobs::IngestQueue;
use shotlist_rank::{CandidateCache, RankingEngine};
use shotlist_store::{FeedbackEngine, InMemoryAssetStore, InMemoryBlobStore, InMemoryTaskStore};

/// State handed to every handler. Everything inside is cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub assets: Arc<InMemoryAssetStore>,
    pub tasks: Arc<InMemoryTaskStore>,
    pub blobs: InMemoryBlobStore,
    pub feedback: Arc<FeedbackEngine<InMemoryAssetStore>>,
    pub engine: Arc<RankingEngine<InMemoryAssetStore>>,
    pub cache: Arc<CandidateCache>,
    pub queue: IngestQueue,
}

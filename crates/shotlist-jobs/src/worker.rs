//! Ingest worker: bounded concurrent execution of queued ingestion chains.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shotlist_core::{defaults, AssetRepository, ProcessingStatus, Result, TaskRepository};

use crate::pipeline::IngestPipeline;

/// Configuration for the ingest worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrently running ingestion chains.
    pub max_concurrent: usize,
    /// Whether to enable ingestion processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::QUEUE_POLL_INTERVAL_MS,
            max_concurrent: defaults::PIPELINE_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `INGEST_WORKER_ENABLED` | `true` | Enable/disable ingestion |
    /// | `PIPELINE_MAX_CONCURRENT` | `4` | Max concurrent chains |
    /// | `INGEST_POLL_INTERVAL_MS` | `500` | Polling interval when idle |
    pub fn from_env() -> Self {
        let enabled = std::env::var("INGEST_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent = std::env::var(defaults::ENV_PIPELINE_MAX_CONCURRENT)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::PIPELINE_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("INGEST_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::QUEUE_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the ingest worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// An ingestion chain was started.
    IngestStarted { asset_id: Uuid },
    /// Ingestion progress was updated.
    IngestProgress {
        asset_id: Uuid,
        percent: u8,
        message: Option<String>,
    },
    /// An ingestion chain reached a terminal status.
    IngestFinished {
        asset_id: Uuid,
        status: ProcessingStatus,
    },
    /// An ingestion chain failed on infrastructure, not stage semantics.
    IngestFailed { asset_id: Uuid, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// One queued unit of ingestion work.
pub struct IngestRequest {
    pub asset_id: Uuid,
    pub media: Arc<Vec<u8>>,
}

/// Cloneable producer side of the ingest queue. Also owns the cancellation
/// flags so callers can cancel in-flight work.
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::UnboundedSender<IngestRequest>,
    pending: Arc<AtomicUsize>,
    cancels: Arc<RwLock<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl IngestQueue {
    /// Queue an asset for ingestion.
    pub async fn enqueue(&self, asset_id: Uuid, media: Arc<Vec<u8>>) -> Result<()> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancels.write().await.insert(asset_id, flag);
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(IngestRequest { asset_id, media })
            .map_err(|_| shotlist_core::Error::Internal("ingest queue closed".into()))?;
        debug!(asset_id = %asset_id, "Queued asset for ingestion");
        Ok(())
    }

    /// Request cancellation of a queued or running chain. Returns whether a
    /// chain was known for the asset.
    pub async fn cancel(&self, asset_id: Uuid) -> bool {
        match self.cancels.read().await.get(&asset_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                info!(asset_id = %asset_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Number of chains queued or running.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    async fn flag_for(&self, asset_id: Uuid) -> Arc<AtomicBool> {
        self.cancels
            .read()
            .await
            .get(&asset_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)))
    }

    async fn finish(&self, asset_id: Uuid) {
        self.cancels.write().await.remove(&asset_id);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| shotlist_core::Error::Internal("failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that drains the ingest queue through the pipeline, at most
/// `max_concurrent` chains at a time.
pub struct IngestWorker<A: AssetRepository + 'static, T: TaskRepository + 'static> {
    pipeline: Arc<IngestPipeline<A, T>>,
    config: WorkerConfig,
    queue: IngestQueue,
    rx: mpsc::UnboundedReceiver<IngestRequest>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl<A: AssetRepository + 'static, T: TaskRepository + 'static> IngestWorker<A, T> {
    pub fn new(pipeline: Arc<IngestPipeline<A, T>>, config: WorkerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            pipeline,
            config,
            queue: IngestQueue {
                tx,
                pending: Arc::new(AtomicUsize::new(0)),
                cancels: Arc::new(RwLock::new(HashMap::new())),
            },
            rx,
            event_tx,
        }
    }

    /// The producer handle used to enqueue and cancel work.
    pub fn queue(&self) -> IngestQueue {
        self.queue.clone()
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    #[instrument(skip_all)]
    async fn run(mut self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Ingest worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent,
            "Ingest worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Ingest worker received shutdown signal");
                break;
            }

            let mut tasks = tokio::task::JoinSet::new();
            let mut claimed = 0;
            for _ in 0..self.config.max_concurrent {
                match self.rx.try_recv() {
                    Ok(request) => {
                        claimed += 1;
                        let pipeline = self.pipeline.clone();
                        let queue = self.queue.clone();
                        let event_tx = self.event_tx.clone();
                        tasks.spawn(async move {
                            execute_chain(pipeline, queue, event_tx, request).await;
                        });
                    }
                    Err(_) => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Ingest worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing ingestion batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Ingestion task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Ingest worker stopped");
    }
}

async fn execute_chain<A: AssetRepository, T: TaskRepository>(
    pipeline: Arc<IngestPipeline<A, T>>,
    queue: IngestQueue,
    event_tx: broadcast::Sender<WorkerEvent>,
    request: IngestRequest,
) {
    let asset_id = request.asset_id;
    let _ = event_tx.send(WorkerEvent::IngestStarted { asset_id });

    let cancel = queue.flag_for(asset_id).await;
    let progress_tx = event_tx.clone();
    let on_progress = Box::new(move |percent: u8, message: Option<&str>| {
        let _ = progress_tx.send(WorkerEvent::IngestProgress {
            asset_id,
            percent,
            message: message.map(String::from),
        });
    });

    match pipeline
        .run(asset_id, request.media, cancel, Some(on_progress))
        .await
    {
        Ok(status) => {
            let _ = event_tx.send(WorkerEvent::IngestFinished { asset_id, status });
        }
        Err(e) => {
            warn!(asset_id = %asset_id, error = %e, "Ingestion chain errored");
            let _ = event_tx.send(WorkerEvent::IngestFailed {
                asset_id,
                error: e.to_string(),
            });
        }
    }

    queue.finish(asset_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::stages::{EmbeddingStage, ProxyStage, TranscriptStage};
    use shotlist_core::{Asset, IngestTask, TaskStatus};
    use shotlist_inference::{MockEmbeddingBackend, MockTranscriptionBackend};
    use shotlist_store::{InMemoryAssetStore, InMemoryTaskStore};

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, defaults::QUEUE_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent, defaults::PIPELINE_MAX_CONCURRENT);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(50)
            .with_max_concurrent(2)
            .with_enabled(false);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.max_concurrent, 2);
        assert!(!config.enabled);

        // Concurrency floor of one.
        assert_eq!(WorkerConfig::default().with_max_concurrent(0).max_concurrent, 1);
    }

    fn build_worker() -> (
        Arc<InMemoryAssetStore>,
        Arc<InMemoryTaskStore>,
        tempfile::TempDir,
        IngestWorker<InMemoryAssetStore, InMemoryTaskStore>,
    ) {
        let assets = Arc::new(InMemoryAssetStore::new());
        let tasks = Arc::new(InMemoryTaskStore::new());
        let dir = tempfile::tempdir().unwrap();

        let pipeline = IngestPipeline::new(
            assets.clone(),
            tasks.clone(),
            PipelineConfig::default().with_backoff_base_ms(1),
        )
        .register(ProxyStage::new(assets.clone()).with_output_dir(dir.path()))
        .register(TranscriptStage::new(
            assets.clone(),
            Some(Arc::new(MockTranscriptionBackend::new()) as _),
        ))
        .register(EmbeddingStage::new(
            assets.clone(),
            Arc::new(MockEmbeddingBackend::with_dimension(8)),
        ));

        let worker = IngestWorker::new(
            Arc::new(pipeline),
            WorkerConfig::default().with_poll_interval(10),
        );
        (assets, tasks, dir, worker)
    }

    #[tokio::test]
    async fn test_worker_processes_queued_asset() {
        let (assets, tasks, _dir, worker) = build_worker();

        let asset = Asset::new(Uuid::new_v4(), "/media/clip.mp4", "video/mp4");
        let asset_id = asset.id;
        assets.create(asset).await.unwrap();
        tasks.create(IngestTask::new(asset_id)).await.unwrap();

        let queue = worker.queue();
        let mut events = worker.events();
        let handle = worker.start();

        queue
            .enqueue(asset_id, Arc::new(vec![0u8; 4096]))
            .await
            .unwrap();

        let mut finished = None;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Ok(WorkerEvent::IngestFinished { asset_id: id, status })) => {
                    finished = Some((id, status));
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }

        let (id, status) = finished.expect("ingestion finished");
        assert_eq!(id, asset_id);
        assert_eq!(status, ProcessingStatus::Done);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(
            tasks.get_by_asset(asset_id).await.unwrap().status,
            TaskStatus::Succeeded
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_marks_chain_cancelled() {
        let (assets, tasks, _dir, worker) = build_worker();

        let asset = Asset::new(Uuid::new_v4(), "/media/clip.mp4", "video/mp4");
        let asset_id = asset.id;
        assets.create(asset).await.unwrap();
        tasks.create(IngestTask::new(asset_id)).await.unwrap();

        let queue = worker.queue();
        let mut events = worker.events();

        // Cancel before the worker ever starts, so the flag is set by the
        // time the chain runs.
        queue
            .enqueue(asset_id, Arc::new(vec![0u8; 4096]))
            .await
            .unwrap();
        assert!(queue.cancel(asset_id).await);

        let handle = worker.start();

        let mut status = None;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
                Ok(Ok(WorkerEvent::IngestFinished { status: s, .. })) => {
                    status = Some(s);
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }
        assert_eq!(status, Some(ProcessingStatus::Cancelled));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_unknown_asset_is_false() {
        let (_assets, _tasks, _dir, worker) = build_worker();
        assert!(!worker.queue().cancel(Uuid::new_v4()).await);
    }
}

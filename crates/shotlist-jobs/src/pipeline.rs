//! Ordered stage execution with retries, timeouts and checkpoint resume.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use shotlist_core::{
    defaults, AssetRepository, ProcessingStatus, Result, StageKind, StageStatus, TaskRepository,
    TaskStatus,
};

use crate::handler::{ProgressCallback, StageContext, StageHandler, StageOutcome};

/// Largest exponent applied to the backoff base. Caps the delay at
/// base * 2^10 no matter how large the retry budget is configured.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum attempts per stage, including the first.
    pub max_retries: u32,
    /// Timeout for a single stage attempt in seconds.
    pub stage_timeout_secs: u64,
    /// Base delay for exponential retry backoff in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::STAGE_MAX_RETRIES,
            stage_timeout_secs: defaults::STAGE_TIMEOUT_SECS,
            backoff_base_ms: defaults::STAGE_BACKOFF_BASE_MS,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PIPELINE_STAGE_MAX_RETRIES` | `3` |
    /// | `PIPELINE_STAGE_TIMEOUT_SECS` | `120` |
    pub fn from_env() -> Self {
        let max_retries = std::env::var(defaults::ENV_STAGE_MAX_RETRIES)
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::STAGE_MAX_RETRIES)
            .max(1);
        let stage_timeout_secs = std::env::var(defaults::ENV_STAGE_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::STAGE_TIMEOUT_SECS);
        Self {
            max_retries,
            stage_timeout_secs,
            backoff_base_ms: defaults::STAGE_BACKOFF_BASE_MS,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_stage_timeout(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = secs;
        self
    }

    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }
}

/// How a stage ended after the retry loop.
enum StageRun {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Drives one asset through the ordered stage chain.
pub struct IngestPipeline<A: AssetRepository, T: TaskRepository> {
    assets: Arc<A>,
    tasks: Arc<T>,
    handlers: Vec<Arc<dyn StageHandler>>,
    config: PipelineConfig,
}

impl<A: AssetRepository, T: TaskRepository> IngestPipeline<A, T> {
    pub fn new(assets: Arc<A>, tasks: Arc<T>, config: PipelineConfig) -> Self {
        Self {
            assets,
            tasks,
            handlers: Vec::new(),
            config,
        }
    }

    /// Register a stage handler. Execution order follows the canonical stage
    /// order, not registration order.
    pub fn register<H: StageHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    fn handler_for(&self, kind: StageKind) -> Option<Arc<dyn StageHandler>> {
        self.handlers.iter().find(|h| h.kind() == kind).cloned()
    }

    /// Run the full chain for one asset. Returns the terminal processing
    /// status; infrastructure failures surface as errors.
    ///
    /// Completed stages are skipped, so re-running after a crash resumes
    /// from the first unfinished stage. The partial-failure policy: only a
    /// critical-stage failure fails the asset.
    #[instrument(skip(self, media, cancel, on_progress), fields(asset_id = %asset_id))]
    pub async fn run(
        &self,
        asset_id: Uuid,
        media: Arc<Vec<u8>>,
        cancel: Arc<AtomicBool>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ProcessingStatus> {
        let start = Instant::now();
        let asset = self.assets.get(asset_id).await?;

        self.assets
            .set_processing_status(asset_id, ProcessingStatus::Processing)
            .await?;
        self.tasks
            .set_status(asset_id, TaskStatus::Running, None)
            .await?;

        let ordered = StageKind::ordered();
        let total = ordered.len() as u32;

        for (index, kind) in ordered.into_iter().enumerate() {
            let Some(handler) = self.handler_for(kind) else {
                warn!(stage = %kind, "No handler registered for stage, skipping");
                continue;
            };

            let snapshot = self.assets.get(asset_id).await?;
            if snapshot.metadata.stage(kind).status == StageStatus::Succeeded {
                info!(stage = %kind, "Stage already complete, resuming past it");
                continue;
            }

            let base_pct = (index as u32 * 100 / total) as u8;
            self.report(asset_id, base_pct, &format!("{} stage running", kind), &on_progress)
                .await;

            let run = self
                .run_stage(asset_id, kind, handler, &media, &cancel)
                .await?;

            match run {
                StageRun::Succeeded => {
                    let done_pct = ((index as u32 + 1) * 100 / total) as u8;
                    self.report(
                        asset_id,
                        done_pct.min(99),
                        &format!("{} stage complete", kind),
                        &on_progress,
                    )
                    .await;
                }
                StageRun::Cancelled => {
                    info!(stage = %kind, "Ingestion cancelled");
                    self.assets
                        .set_processing_status(asset_id, ProcessingStatus::Cancelled)
                        .await?;
                    self.tasks
                        .set_status(asset_id, TaskStatus::Cancelled, None)
                        .await?;
                    return Ok(ProcessingStatus::Cancelled);
                }
                StageRun::Failed(err) if kind.is_critical() => {
                    error!(stage = %kind, error = %err, "Critical stage failed, asset unusable");
                    self.assets
                        .set_processing_status(asset_id, ProcessingStatus::Error)
                        .await?;
                    self.tasks
                        .set_status(asset_id, TaskStatus::Failed, Some(err))
                        .await?;
                    return Ok(ProcessingStatus::Error);
                }
                StageRun::Failed(err) => {
                    warn!(stage = %kind, error = %err, "Non-critical stage failed, continuing");
                }
            }
        }

        self.assets
            .set_processing_status(asset_id, ProcessingStatus::Done)
            .await?;
        self.tasks
            .update_progress(asset_id, 100, Some("ingestion complete".into()))
            .await?;
        self.tasks
            .set_status(asset_id, TaskStatus::Succeeded, None)
            .await?;

        info!(
            mime_type = %asset.mime_type,
            duration_ms = start.elapsed().as_millis() as u64,
            "Ingestion complete"
        );
        Ok(ProcessingStatus::Done)
    }

    /// Retry loop for one stage: bounded attempts, per-attempt timeout,
    /// exponential backoff between attempts.
    async fn run_stage(
        &self,
        asset_id: Uuid,
        kind: StageKind,
        handler: Arc<dyn StageHandler>,
        media: &Arc<Vec<u8>>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<StageRun> {
        let timeout = Duration::from_secs(self.config.stage_timeout_secs);

        loop {
            if cancel.load(std::sync::atomic::Ordering::SeqCst) {
                self.persist_stage(asset_id, kind, |state| {
                    state.status = StageStatus::Cancelled;
                })
                .await?;
                return Ok(StageRun::Cancelled);
            }

            let snapshot = self.assets.get(asset_id).await?;
            let state = snapshot.metadata.stage(kind);
            let attempt = state.attempts + 1;

            self.persist_stage(asset_id, kind, |s| {
                s.status = StageStatus::Running;
                s.attempts = attempt;
            })
            .await?;

            let ctx = StageContext::new(snapshot, media.clone())
                .with_checkpoint(state.checkpoint.clone())
                .with_cancel_flag(cancel.clone());

            let outcome = match tokio::time::timeout(timeout, handler.run(&ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => StageOutcome::Retry(format!(
                    "stage timed out after {}s",
                    self.config.stage_timeout_secs
                )),
            };

            match outcome {
                StageOutcome::Cancelled => {
                    self.persist_stage(asset_id, kind, |s| {
                        s.status = StageStatus::Cancelled;
                    })
                    .await?;
                    return Ok(StageRun::Cancelled);
                }
                StageOutcome::Success(checkpoint) => {
                    self.persist_stage(asset_id, kind, |s| {
                        s.status = StageStatus::Succeeded;
                        s.checkpoint = checkpoint.clone();
                        s.last_error = None;
                        s.completed_at = Some(Utc::now());
                    })
                    .await?;
                    return Ok(StageRun::Succeeded);
                }
                StageOutcome::Failed(err) => {
                    self.persist_stage(asset_id, kind, |s| {
                        s.status = StageStatus::Failed;
                        s.last_error = Some(err.clone());
                    })
                    .await?;
                    return Ok(StageRun::Failed(err));
                }
                StageOutcome::Retry(err) => {
                    warn!(
                        stage = %kind,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %err,
                        "Stage attempt failed"
                    );
                    if attempt >= self.config.max_retries {
                        let exhausted =
                            format!("{} (after {} attempts)", err, attempt);
                        self.persist_stage(asset_id, kind, |s| {
                            s.status = StageStatus::Failed;
                            s.last_error = Some(exhausted.clone());
                        })
                        .await?;
                        return Ok(StageRun::Failed(exhausted));
                    }
                    self.persist_stage(asset_id, kind, |s| {
                        s.last_error = Some(err.clone());
                    })
                    .await?;
                    sleep(self.backoff_delay(attempt)).await;
                }
            }
        }
    }

    /// Delay before the next attempt. The exponent is capped so a large
    /// retry budget cannot overflow the shift.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        Duration::from_millis(self.config.backoff_base_ms.saturating_mul(1 << exp))
    }

    /// Stage bookkeeping goes through the store's atomic mutation so it can
    /// never clobber a feedback record landing on the same asset.
    async fn persist_stage<F>(&self, asset_id: Uuid, kind: StageKind, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut shotlist_core::StageState) + Send,
    {
        self.assets
            .mutate_metadata(asset_id, move |metadata| {
                mutate(metadata.stages.entry(kind).or_default());
            })
            .await?;
        Ok(())
    }

    async fn report(
        &self,
        asset_id: Uuid,
        percent: u8,
        message: &str,
        on_progress: &Option<ProgressCallback>,
    ) {
        if let Err(e) = self
            .tasks
            .update_progress(asset_id, percent, Some(message.to_string()))
            .await
        {
            warn!(error = %e, "Failed to persist task progress");
        }
        if let Some(cb) = on_progress {
            cb(percent, Some(message));
        }
    }
}

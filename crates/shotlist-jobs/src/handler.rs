//! Stage handler contract for the ingestion pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use shotlist_core::{Asset, StageKind};

/// Progress callback type for stage handlers.
pub type ProgressCallback = Box<dyn Fn(u8, Option<&str>) + Send + Sync>;

/// Context provided to a stage handler for one attempt.
pub struct StageContext {
    /// Snapshot of the asset as it stood when the attempt started. Handlers
    /// re-read through their repository before writing.
    pub asset: Asset,
    /// Raw media bytes for the asset.
    pub media: Arc<Vec<u8>>,
    /// Resume point persisted by a previous attempt, if any.
    pub checkpoint: Option<JsonValue>,
    cancel: Arc<AtomicBool>,
    progress_callback: Option<ProgressCallback>,
}

impl StageContext {
    pub fn new(asset: Asset, media: Arc<Vec<u8>>) -> Self {
        Self {
            asset,
            media,
            checkpoint: None,
            cancel: Arc::new(AtomicBool::new(false)),
            progress_callback: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: Option<JsonValue>) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u8, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report stage-local progress to the callback.
    pub fn report_progress(&self, percent: u8, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    /// Whether cancellation was requested. Handlers check this between
    /// units of work.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Result of one stage attempt.
#[derive(Debug)]
pub enum StageOutcome {
    /// Stage completed, with an optional final checkpoint.
    Success(Option<JsonValue>),
    /// Transient failure; the pipeline may retry with backoff.
    Retry(String),
    /// Permanent failure; no further attempts.
    Failed(String),
    /// The cancel flag was observed at a stage-internal checkpoint. The
    /// chain ends in terminal `cancelled`, never `error`.
    Cancelled,
}

/// One stage of the ingestion pipeline.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Which stage this handler implements.
    fn kind(&self) -> StageKind;

    /// Run one attempt of the stage. Handlers persist their own domain
    /// outputs; the pipeline persists stage bookkeeping.
    async fn run(&self, ctx: &StageContext) -> StageOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[test]
    fn test_context_cancel_flag() {
        let asset = Asset::new(Uuid::new_v4(), "/media/a.mp4", "video/mp4");
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = StageContext::new(asset, Arc::new(Vec::new())).with_cancel_flag(flag.clone());
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_context_progress_callback() {
        let asset = Asset::new(Uuid::new_v4(), "/media/a.mp4", "video/mp4");
        let seen: Arc<Mutex<Vec<(u8, Option<String>)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let ctx = StageContext::new(asset, Arc::new(Vec::new())).with_progress_callback(
            move |pct, msg| {
                seen_cb.lock().unwrap().push((pct, msg.map(String::from)));
            },
        );

        ctx.report_progress(40, Some("extracting"));
        ctx.report_progress(80, None);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (40, Some("extracting".to_string())));
        assert_eq!(seen[1], (80, None));
    }

    #[test]
    fn test_context_without_callback_is_noop() {
        let asset = Asset::new(Uuid::new_v4(), "/media/a.mp4", "video/mp4");
        let ctx = StageContext::new(asset, Arc::new(Vec::new()));
        ctx.report_progress(50, Some("ignored"));
    }
}

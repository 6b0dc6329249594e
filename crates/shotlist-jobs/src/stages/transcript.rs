//! Transcript stage: audio-to-text with time-aligned segments.
//!
//! Non-critical: a failed or missing transcription backend never blocks
//! recall eligibility, it only leaves the transcript embedding space empty.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use shotlist_core::{AssetRepository, Segment, StageKind};
use shotlist_inference::TranscriptionBackend;

use crate::handler::{StageContext, StageHandler, StageOutcome};

pub struct TranscriptStage<A: AssetRepository> {
    assets: Arc<A>,
    backend: Option<Arc<dyn TranscriptionBackend>>,
}

impl<A: AssetRepository> TranscriptStage<A> {
    pub fn new(assets: Arc<A>, backend: Option<Arc<dyn TranscriptionBackend>>) -> Self {
        Self { assets, backend }
    }

    fn has_audio(mime_type: &str) -> bool {
        mime_type.starts_with("audio/") || mime_type.starts_with("video/")
    }
}

#[async_trait]
impl<A: AssetRepository> StageHandler for TranscriptStage<A> {
    fn kind(&self) -> StageKind {
        StageKind::Transcript
    }

    async fn run(&self, ctx: &StageContext) -> StageOutcome {
        if ctx.is_cancelled() {
            return StageOutcome::Cancelled;
        }

        if !Self::has_audio(&ctx.asset.mime_type) {
            debug!(
                asset_id = %ctx.asset.id,
                mime_type = %ctx.asset.mime_type,
                "No audio track, transcript stage is a no-op"
            );
            return StageOutcome::Success(None);
        }

        let Some(backend) = &self.backend else {
            return StageOutcome::Failed("no transcription backend configured".into());
        };

        let result = match backend
            .transcribe(&ctx.media, &ctx.asset.mime_type, None)
            .await
        {
            Ok(r) => r,
            Err(e) => return StageOutcome::Retry(format!("transcription: {}", e)),
        };
        ctx.report_progress(70, Some("transcription complete"));

        let segments: Vec<Segment> = result
            .segments
            .iter()
            .map(|s| Segment {
                start_secs: s.start_secs,
                end_secs: s.end_secs,
                description: s.text.trim().to_string(),
                tags: Vec::new(),
            })
            .collect();

        if let Err(e) = self
            .assets
            .mutate_metadata(ctx.asset.id, move |metadata| metadata.segments = segments)
            .await
        {
            return StageOutcome::Retry(format!("persist segments: {}", e));
        }

        info!(
            asset_id = %ctx.asset.id,
            segments = result.segments.len(),
            language = ?result.language,
            "Transcript stage complete"
        );

        StageOutcome::Success(Some(json!({
            "full_text": result.full_text,
            "language": result.language,
            "duration_secs": result.duration_secs,
        })))
    }
}

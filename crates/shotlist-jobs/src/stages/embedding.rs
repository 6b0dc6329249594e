//! Embedding stage: per-space vector generation.
//!
//! Critical: this stage gates recall eligibility. Each embedding space is
//! written as soon as it is produced, so a retried attempt skips spaces that
//! already landed instead of recomputing them.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use shotlist_core::{Asset, AssetRepository, EmbeddingSpace, StageKind};
use shotlist_inference::EmbeddingBackend;

use crate::handler::{StageContext, StageHandler, StageOutcome};

pub struct EmbeddingStage<A: AssetRepository> {
    assets: Arc<A>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl<A: AssetRepository> EmbeddingStage<A> {
    pub fn new(assets: Arc<A>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { assets, embedder }
    }

    /// Text input for the description space: the tag prompt when tags exist,
    /// otherwise a filename-derived fallback so every asset has at least one
    /// embeddable signal.
    fn description_text(asset: &Asset) -> String {
        let prompt = asset.metadata.global_tags.to_prompt();
        if !prompt.is_empty() {
            return prompt;
        }
        let stem = Path::new(&asset.media_path)
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_default();
        format!("{} ({})", stem.trim(), asset.mime_type)
    }

    fn transcript_text(asset: &Asset) -> Option<String> {
        if asset.metadata.segments.is_empty() {
            return None;
        }
        let text = asset
            .metadata
            .segments
            .iter()
            .map(|s| s.description.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Some(text)
    }

    async fn store_space(
        &self,
        asset_id: uuid::Uuid,
        space: EmbeddingSpace,
        vector: Vec<f32>,
    ) -> shotlist_core::Result<()> {
        self.assets
            .mutate_metadata(asset_id, move |metadata| {
                metadata.embeddings.insert(space, vector);
            })
            .await?;
        Ok(())
    }

    /// Bytes to embed for the visual space: images embed directly, other
    /// media embed their proxy thumbnail when one exists.
    async fn visual_bytes(&self, ctx: &StageContext, asset: &Asset) -> Option<(Vec<u8>, String)> {
        if asset.mime_type.starts_with("image/") {
            return Some((ctx.media.to_vec(), asset.mime_type.clone()));
        }
        let thumb = asset.thumbnail_path.as_ref()?;
        let bytes = tokio::fs::read(thumb).await.ok()?;
        if bytes.is_empty() {
            return None;
        }
        Some((bytes, "image/jpeg".to_string()))
    }
}

#[async_trait]
impl<A: AssetRepository> StageHandler for EmbeddingStage<A> {
    fn kind(&self) -> StageKind {
        StageKind::Embedding
    }

    async fn run(&self, ctx: &StageContext) -> StageOutcome {
        let asset = match self.assets.get(ctx.asset.id).await {
            Ok(a) => a,
            Err(e) => return StageOutcome::Retry(format!("load asset: {}", e)),
        };
        let done = |space: EmbeddingSpace| asset.metadata.embeddings.contains_key(&space);
        let mut spaces_written: Vec<String> = asset
            .metadata
            .embeddings
            .keys()
            .map(|s| s.to_string())
            .collect();

        if !done(EmbeddingSpace::Description) {
            if ctx.is_cancelled() {
                return StageOutcome::Cancelled;
            }
            let text = Self::description_text(&asset);
            let vector = match self.embedder.embed_text(&text).await {
                Ok(v) => v,
                Err(e) => return StageOutcome::Retry(format!("description embed: {}", e)),
            };
            if let Err(e) = self
                .store_space(asset.id, EmbeddingSpace::Description, vector)
                .await
            {
                return StageOutcome::Retry(format!("persist description embed: {}", e));
            }
            spaces_written.push(EmbeddingSpace::Description.to_string());
            ctx.report_progress(40, Some("description embedded"));
        }

        if !done(EmbeddingSpace::Transcript) {
            if ctx.is_cancelled() {
                return StageOutcome::Cancelled;
            }
            if let Some(text) = Self::transcript_text(&asset) {
                let vector = match self.embedder.embed_text(&text).await {
                    Ok(v) => v,
                    Err(e) => return StageOutcome::Retry(format!("transcript embed: {}", e)),
                };
                if let Err(e) = self
                    .store_space(asset.id, EmbeddingSpace::Transcript, vector)
                    .await
                {
                    return StageOutcome::Retry(format!("persist transcript embed: {}", e));
                }
                spaces_written.push(EmbeddingSpace::Transcript.to_string());
            } else {
                debug!(asset_id = %asset.id, "No transcript text, skipping transcript space");
            }
            ctx.report_progress(70, Some("transcript embedded"));
        }

        if !done(EmbeddingSpace::Visual) {
            if ctx.is_cancelled() {
                return StageOutcome::Cancelled;
            }
            if let Some((bytes, mime)) = self.visual_bytes(ctx, &asset).await {
                let vector = match self.embedder.embed_image(&bytes, &mime).await {
                    Ok(v) => v,
                    Err(e) => return StageOutcome::Retry(format!("visual embed: {}", e)),
                };
                if let Err(e) = self
                    .store_space(asset.id, EmbeddingSpace::Visual, vector)
                    .await
                {
                    return StageOutcome::Retry(format!("persist visual embed: {}", e));
                }
                spaces_written.push(EmbeddingSpace::Visual.to_string());
            } else {
                debug!(asset_id = %asset.id, "No visual source, skipping visual space");
            }
        }

        if spaces_written.is_empty() {
            return StageOutcome::Failed("no embeddable content in asset".into());
        }

        info!(
            asset_id = %asset.id,
            spaces = spaces_written.len(),
            model = self.embedder.model_name(),
            "Embedding stage complete"
        );
        ctx.report_progress(100, Some("embedding complete"));

        StageOutcome::Success(Some(json!({
            "spaces": spaces_written,
            "model": self.embedder.model_name(),
            "dimension": self.embedder.dimension(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotlist_core::tags::{TagCategory, TagVector};
    use shotlist_core::Segment;
    use shotlist_inference::MockEmbeddingBackend;
    use shotlist_store::InMemoryAssetStore;
    use uuid::Uuid;

    fn video_asset() -> Asset {
        Asset::new(Uuid::new_v4(), "/media/rooftop_chase.mp4", "video/mp4")
    }

    #[tokio::test]
    async fn test_embeds_description_and_transcript_spaces() {
        let store = Arc::new(InMemoryAssetStore::new());
        let mut asset = video_asset();
        asset.metadata.global_tags = TagVector::new().with(TagCategory::SceneType, "chase", 1.0);
        asset.metadata.segments.push(Segment {
            start_secs: 0.0,
            end_secs: 4.0,
            description: "two figures run".to_string(),
            tags: Vec::new(),
        });
        let asset_id = asset.id;
        store.create(asset.clone()).await.unwrap();

        let embedder = Arc::new(MockEmbeddingBackend::with_dimension(8));
        let stage = EmbeddingStage::new(store.clone(), embedder.clone());
        let ctx = StageContext::new(asset, Arc::new(vec![0u8; 32]));

        assert!(matches!(stage.run(&ctx).await, StageOutcome::Success(_)));
        let stored = store.get(asset_id).await.unwrap();
        assert!(stored
            .metadata
            .embeddings
            .contains_key(&EmbeddingSpace::Description));
        assert!(stored
            .metadata
            .embeddings
            .contains_key(&EmbeddingSpace::Transcript));
        // No thumbnail, no image media: visual space is skipped.
        assert!(!stored
            .metadata
            .embeddings
            .contains_key(&EmbeddingSpace::Visual));

        // The description input came from the tag prompt.
        assert!(embedder.calls().iter().any(|c| c.contains("scene_type: chase")));
    }

    #[tokio::test]
    async fn test_image_media_gets_visual_space() {
        let store = Arc::new(InMemoryAssetStore::new());
        let asset = Asset::new(Uuid::new_v4(), "/media/frame.png", "image/png");
        let asset_id = asset.id;
        store.create(asset.clone()).await.unwrap();

        let stage = EmbeddingStage::new(
            store.clone(),
            Arc::new(MockEmbeddingBackend::with_dimension(8)),
        );
        let ctx = StageContext::new(asset, Arc::new(vec![9u8; 128]));

        assert!(matches!(stage.run(&ctx).await, StageOutcome::Success(_)));
        let stored = store.get(asset_id).await.unwrap();
        assert!(stored
            .metadata
            .embeddings
            .contains_key(&EmbeddingSpace::Visual));
    }

    #[tokio::test]
    async fn test_backend_failure_is_retryable() {
        let store = Arc::new(InMemoryAssetStore::new());
        let asset = video_asset();
        store.create(asset.clone()).await.unwrap();

        let embedder = Arc::new(MockEmbeddingBackend::with_dimension(8));
        embedder.fail_next_embeds(1);
        let stage = EmbeddingStage::new(store, embedder);
        let ctx = StageContext::new(asset, Arc::new(vec![0u8; 32]));
        assert!(matches!(stage.run(&ctx).await, StageOutcome::Retry(_)));
    }

    #[tokio::test]
    async fn test_retry_skips_spaces_already_written() {
        let store = Arc::new(InMemoryAssetStore::new());
        let mut asset = video_asset();
        asset.metadata.segments.push(Segment {
            start_secs: 0.0,
            end_secs: 2.0,
            description: "a quiet street".to_string(),
            tags: Vec::new(),
        });
        let asset_id = asset.id;
        store.create(asset.clone()).await.unwrap();

        let embedder = Arc::new(MockEmbeddingBackend::with_dimension(8));
        let stage = EmbeddingStage::new(store.clone(), embedder.clone());
        let ctx = StageContext::new(asset.clone(), Arc::new(vec![0u8; 32]));

        // Simulate a prior attempt that persisted only the description space.
        let mut stored = store.get(asset_id).await.unwrap();
        stored
            .metadata
            .embeddings
            .insert(EmbeddingSpace::Description, vec![1.0; 8]);
        store
            .update_metadata(asset_id, stored.metadata)
            .await
            .unwrap();

        let before = embedder.call_count();
        assert!(matches!(stage.run(&ctx).await, StageOutcome::Success(_)));
        // Only the transcript space was embedded on the retry.
        assert_eq!(embedder.call_count(), before + 1);

        let stored = store.get(asset_id).await.unwrap();
        assert_eq!(
            stored.metadata.embeddings[&EmbeddingSpace::Description],
            vec![1.0; 8]
        );
        assert!(stored
            .metadata
            .embeddings
            .contains_key(&EmbeddingSpace::Transcript));
    }
}

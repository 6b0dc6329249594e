//! Trust & feedback engine.
//!
//! Feedback records are appended to the immutable per-asset history *before*
//! the trust aggregate is updated, so the aggregate is always reconstructible
//! by replaying the history from the fixed baseline. Updates to one asset's
//! trust score are serialized through a per-asset mutex; different assets
//! proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use shotlist_core::{defaults, AssetRepository, FeedbackRecord, FeedbackType, Result};

/// Trust update rates and baseline.
///
/// The update rule is deliberately a simple, fully specified arithmetic step
/// (`trust' = clamp(trust + rate(type), 0, 1)`) rather than a learned model,
/// so it stays auditable and replay-reproducible.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub baseline: f32,
    pub rate_accept: f32,
    pub rate_reject: f32,
    pub rate_ignore: f32,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            baseline: defaults::TRUST_BASELINE,
            rate_accept: defaults::TRUST_RATE_ACCEPT,
            rate_reject: defaults::TRUST_RATE_REJECT,
            rate_ignore: defaults::TRUST_RATE_IGNORE,
        }
    }
}

impl TrustConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TRUST_BASELINE` | `0.5` |
    /// | `TRUST_RATE_ACCEPT` | `0.1` |
    /// | `TRUST_RATE_REJECT` | `-0.1` |
    /// | `TRUST_RATE_IGNORE` | `-0.02` |
    pub fn from_env() -> Self {
        let read = |var: &str, default: f32| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(default)
        };
        Self {
            baseline: read(defaults::ENV_TRUST_BASELINE, defaults::TRUST_BASELINE).clamp(0.0, 1.0),
            rate_accept: read(defaults::ENV_TRUST_RATE_ACCEPT, defaults::TRUST_RATE_ACCEPT),
            rate_reject: read(defaults::ENV_TRUST_RATE_REJECT, defaults::TRUST_RATE_REJECT),
            rate_ignore: read(defaults::ENV_TRUST_RATE_IGNORE, defaults::TRUST_RATE_IGNORE),
        }
    }

    /// Trust delta for a feedback type.
    pub fn rate(&self, feedback_type: FeedbackType) -> f32 {
        match feedback_type {
            FeedbackType::ExplicitAccept => self.rate_accept,
            FeedbackType::ExplicitReject => self.rate_reject,
            FeedbackType::ImplicitIgnore => self.rate_ignore,
        }
    }

    /// Replay a feedback history from the baseline.
    pub fn replay<'a>(&self, history: impl IntoIterator<Item = &'a FeedbackRecord>) -> f32 {
        history.into_iter().fold(self.baseline, |trust, record| {
            (trust + self.rate(record.feedback_type)).clamp(0.0, 1.0)
        })
    }
}

/// Feedback recording and trust score maintenance.
pub struct FeedbackEngine<R: AssetRepository> {
    assets: Arc<R>,
    config: TrustConfig,
    /// Single-writer-per-asset locks, created lazily.
    locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<R: AssetRepository> FeedbackEngine<R> {
    pub fn new(assets: Arc<R>, config: TrustConfig) -> Self {
        Self {
            assets,
            config,
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    async fn lock_for(&self, asset_id: Uuid) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(&asset_id) {
                return lock.clone();
            }
        }
        let mut locks = self.locks.write().await;
        locks
            .entry(asset_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record a feedback event and update the asset's trust score.
    ///
    /// The record lands in the history before the aggregate moves, and the
    /// append and aggregate update run as one atomic metadata mutation, so a
    /// pipeline write landing on the same asset can never drop the record.
    pub async fn record_feedback(
        &self,
        asset_id: Uuid,
        feedback_type: FeedbackType,
        context: impl Into<String>,
        reason: Option<String>,
    ) -> Result<FeedbackRecord> {
        let lock = self.lock_for(asset_id).await;
        let _guard = lock.lock().await;

        let mut record = FeedbackRecord::new(feedback_type, context);
        if let Some(reason) = reason {
            record = record.with_reason(reason);
        }

        let stored = record.clone();
        let rate = self.config.rate(feedback_type);
        let updated = self
            .assets
            .mutate_metadata(asset_id, move |metadata| {
                // Append first: the aggregate must always be reproducible by
                // replaying the history.
                metadata.feedback_history.push(stored);
                metadata.trust_score = (metadata.trust_score + rate).clamp(0.0, 1.0);
            })
            .await?;

        debug!(
            asset_id = %asset_id,
            feedback = %feedback_type,
            trust_score = updated.metadata.trust_score,
            "Recorded feedback"
        );
        Ok(record)
    }

    /// Current trust score for an asset.
    pub async fn trust_score(&self, asset_id: Uuid) -> Result<f32> {
        Ok(self.assets.get(asset_id).await?.metadata.trust_score)
    }

    /// Recompute the trust score by replaying the full history from the
    /// baseline. Used for audit and for recovering from update-path bugs.
    pub async fn replay_trust(&self, asset_id: Uuid) -> Result<f32> {
        let history = self.assets.get(asset_id).await?.metadata.feedback_history;
        Ok(self.config.replay(history.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InMemoryAssetStore;
    use shotlist_core::{Asset, Error};

    async fn engine_with_asset() -> (FeedbackEngine<InMemoryAssetStore>, Uuid) {
        let store = Arc::new(InMemoryAssetStore::new());
        let asset = Asset::new(Uuid::new_v4(), "/media/clip.mp4", "video/mp4");
        let id = asset.id;
        store.create(asset).await.unwrap();
        (FeedbackEngine::new(store, TrustConfig::default()), id)
    }

    #[tokio::test]
    async fn test_accepts_and_reject_scenario() {
        // 0.5 + 3 accepts (+0.1) + 1 reject (-0.1) = 0.6
        let (engine, id) = engine_with_asset().await;
        for _ in 0..3 {
            engine
                .record_feedback(id, FeedbackType::ExplicitAccept, "scene-1", None)
                .await
                .unwrap();
        }
        engine
            .record_feedback(id, FeedbackType::ExplicitReject, "scene-1", None)
            .await
            .unwrap();

        let trust = engine.trust_score(id).await.unwrap();
        assert!((trust - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_replay_matches_aggregate() {
        let (engine, id) = engine_with_asset().await;
        let sequence = [
            FeedbackType::ExplicitAccept,
            FeedbackType::ImplicitIgnore,
            FeedbackType::ExplicitReject,
            FeedbackType::ExplicitAccept,
            FeedbackType::ImplicitIgnore,
        ];
        for ft in sequence {
            engine.record_feedback(id, ft, "scene-2", None).await.unwrap();
        }
        let aggregate = engine.trust_score(id).await.unwrap();
        let replayed = engine.replay_trust(id).await.unwrap();
        assert!((aggregate - replayed).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_trust_clamped_at_bounds() {
        let (engine, id) = engine_with_asset().await;
        for _ in 0..20 {
            engine
                .record_feedback(id, FeedbackType::ExplicitAccept, "scene-3", None)
                .await
                .unwrap();
        }
        assert_eq!(engine.trust_score(id).await.unwrap(), 1.0);

        for _ in 0..40 {
            engine
                .record_feedback(id, FeedbackType::ExplicitReject, "scene-3", None)
                .await
                .unwrap();
        }
        assert_eq!(engine.trust_score(id).await.unwrap(), 0.0);

        // Replay agrees even after saturation in both directions
        let replayed = engine.replay_trust(id).await.unwrap();
        assert_eq!(replayed, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_feedback_loses_no_update() {
        let (engine, id) = engine_with_asset().await;
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for i in 0..30 {
            let engine = engine.clone();
            let ft = if i % 2 == 0 {
                FeedbackType::ExplicitAccept
            } else {
                FeedbackType::ExplicitReject
            };
            handles.push(tokio::spawn(async move {
                engine
                    .record_feedback(id, ft, "scene-4", None)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Every event landed in the history and the aggregate matches replay.
        let trust = engine.trust_score(id).await.unwrap();
        let replayed = engine.replay_trust(id).await.unwrap();
        assert!((trust - replayed).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&trust));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_feedback_survives_concurrent_stage_writes() {
        use shotlist_core::{StageKind, StageStatus};

        let store = Arc::new(InMemoryAssetStore::new());
        let asset = Asset::new(Uuid::new_v4(), "/media/clip.mp4", "video/mp4");
        let id = asset.id;
        store.create(asset).await.unwrap();
        let engine = Arc::new(FeedbackEngine::new(store.clone(), TrustConfig::default()));

        // A reprocess-style writer mutates stage bookkeeping on the same
        // asset while feedback streams in; every record must survive the
        // interleaving, and so must the stage state.
        let stage_store = store.clone();
        let stages = tokio::spawn(async move {
            for _ in 0..40 {
                stage_store
                    .mutate_metadata(id, |m| {
                        let state = m.stages.entry(StageKind::Embedding).or_default();
                        state.status = StageStatus::Running;
                        state.attempts += 1;
                    })
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        });

        let mut handles = Vec::new();
        for _ in 0..25 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .record_feedback(id, FeedbackType::ExplicitAccept, "scene-5", None)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        stages.await.unwrap();

        let meta = store.get(id).await.unwrap().metadata;
        assert_eq!(meta.feedback_history.len(), 25);
        assert_eq!(meta.stage(StageKind::Embedding).attempts, 40);
        let replayed = engine.replay_trust(id).await.unwrap();
        assert!((meta.trust_score - replayed).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_feedback_on_unknown_asset() {
        let store = Arc::new(InMemoryAssetStore::new());
        let engine = FeedbackEngine::new(store, TrustConfig::default());
        let err = engine
            .record_feedback(Uuid::new_v4(), FeedbackType::ExplicitAccept, "ctx", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AssetNotFound(_)));
    }

    #[test]
    fn test_replay_empty_history_is_baseline() {
        let config = TrustConfig::default();
        let history: Vec<FeedbackRecord> = Vec::new();
        assert_eq!(config.replay(history.iter()), config.baseline);
    }
}

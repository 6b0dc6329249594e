//! Hybrid ranking engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use shotlist_core::tags::TagOverlap;
use shotlist_core::{
    defaults, Asset, AssetRepository, Candidate, CandidateSet, EmbeddingSpace, RecallQuery, Result,
};
use shotlist_inference::EmbeddingBackend;

use crate::cache::query_fingerprint;
use crate::scoring::{match_reason, vector_score};
use crate::strategy::RankStrategy;

/// Configuration for the ranking engine.
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Minimum similarity for a candidate to enter a result set.
    pub similarity_threshold: f32,
    /// Threshold used by the single automatic widening pass.
    pub widened_threshold: f32,
    /// Hard minimum tag overlap for FILTER_THEN_RANK.
    pub min_tag_overlap: f32,
    /// Scores closer than this are ties, broken by trust then recency.
    pub score_epsilon: f32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            widened_threshold: defaults::WIDENED_SIMILARITY_THRESHOLD,
            min_tag_overlap: defaults::MIN_TAG_OVERLAP,
            score_epsilon: defaults::SCORE_EPSILON,
        }
    }
}

impl RankConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `RANK_SIMILARITY_THRESHOLD` | `0.3` |
    /// | `RANK_WIDENED_THRESHOLD` | `0.15` |
    /// | `RANK_MIN_TAG_OVERLAP` | `0.25` |
    pub fn from_env() -> Self {
        let read = |var: &str, default: f32| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(default)
        };
        Self {
            similarity_threshold: read(
                defaults::ENV_SIMILARITY_THRESHOLD,
                defaults::SIMILARITY_THRESHOLD,
            ),
            widened_threshold: read(
                defaults::ENV_WIDENED_THRESHOLD,
                defaults::WIDENED_SIMILARITY_THRESHOLD,
            ),
            min_tag_overlap: read(defaults::ENV_MIN_TAG_OVERLAP, defaults::MIN_TAG_OVERLAP),
            score_epsilon: defaults::SCORE_EPSILON,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_min_tag_overlap(mut self, overlap: f32) -> Self {
        self.min_tag_overlap = overlap;
        self
    }
}

/// One scored asset, before ranking.
struct ScoredAsset {
    asset_id: uuid::Uuid,
    score: f32,
    trust: f32,
    created_at: chrono::DateTime<chrono::Utc>,
    tag_overlap: TagOverlap,
    vector: f32,
    vector_space: Option<EmbeddingSpace>,
}

/// Ranking engine over the asset index.
///
/// Recall is stateless and read-mostly: concurrent recalls across different
/// query keys need no locking here.
pub struct RankingEngine<R: AssetRepository> {
    assets: Arc<R>,
    embedder: Arc<dyn EmbeddingBackend>,
    config: RankConfig,
    recalls: AtomicU64,
}

impl<R: AssetRepository> RankingEngine<R> {
    pub fn new(assets: Arc<R>, embedder: Arc<dyn EmbeddingBackend>, config: RankConfig) -> Self {
        Self {
            assets,
            embedder,
            config,
            recalls: AtomicU64::new(0),
        }
    }

    /// Number of full ranking computations performed. Lets callers verify
    /// that cache operations never trigger recomputation.
    pub fn recalls_performed(&self) -> u64 {
        self.recalls.load(Ordering::SeqCst)
    }

    /// Score and rank eligible assets against the query.
    #[instrument(skip(self, query), fields(query_key = %query.query_key, strategy = %strategy))]
    pub async fn recall(&self, query: &RecallQuery, strategy: RankStrategy) -> Result<CandidateSet> {
        query.validate()?;
        self.recalls.fetch_add(1, Ordering::SeqCst);

        let start = Instant::now();
        let fuzziness = query.clamped_fuzziness();
        let fingerprint = query_fingerprint(query, strategy);

        let assets = self.assets.list_recall_eligible().await?;
        let total_searched = assets.len();

        if assets.is_empty() {
            debug!(query_key = %query.query_key, "Recall against empty corpus");
            return Ok(CandidateSet::empty(
                &query.query_key,
                fingerprint,
                0,
                "No processed assets are available yet. Upload media or wait for ingestion to finish.",
            ));
        }

        let query_embedding = if strategy.uses_vectors(fuzziness) {
            Some(self.embed_query(query).await?)
        } else {
            None
        };

        let scored: Vec<ScoredAsset> = assets
            .iter()
            .map(|asset| self.score_asset(asset, query, strategy, fuzziness, query_embedding.as_deref()))
            .collect();

        // First pass at the configured threshold; if nothing clears it, one
        // widening pass marks the result degraded instead of failing.
        let threshold = self.entry_threshold(strategy, fuzziness, false);
        let mut survivors = self.filter(&scored, strategy, threshold);
        let mut degraded = false;
        if survivors.is_empty() {
            let widened = self.entry_threshold(strategy, fuzziness, true);
            if widened < threshold {
                survivors = self.filter(&scored, strategy, widened);
                if !survivors.is_empty() {
                    warn!(
                        query_key = %query.query_key,
                        threshold,
                        widened,
                        "Threshold widening pass engaged"
                    );
                    degraded = true;
                }
            }
        }

        if survivors.is_empty() {
            return Ok(CandidateSet::empty(
                &query.query_key,
                fingerprint,
                total_searched,
                "No assets matched this description. Try raising fuzziness or removing restrictive tags.",
            ));
        }

        self.sort(&mut survivors, &scored);
        survivors.truncate(query.limit);

        let candidates: Vec<Candidate> = survivors
            .iter()
            .enumerate()
            .map(|(i, idx)| {
                let s = &scored[*idx];
                Candidate {
                    asset_id: s.asset_id,
                    score: s.score,
                    rank: i + 1,
                    matched_tags: s.tag_overlap.matched.clone(),
                    match_reason: match_reason(&s.tag_overlap, s.vector, s.vector_space),
                }
            })
            .collect();

        info!(
            query_key = %query.query_key,
            strategy = %strategy,
            result_count = candidates.len(),
            searched_count = total_searched,
            degraded,
            duration_ms = start.elapsed().as_millis() as u64,
            "Recall complete"
        );

        Ok(CandidateSet {
            query_key: query.query_key.clone(),
            active_rank: 1,
            candidates,
            created_at: Utc::now(),
            fingerprint,
            has_match: true,
            degraded,
            placeholder_message: None,
            total_searched,
        })
    }

    /// Compose the embedding input from notes and tags.
    async fn embed_query(&self, query: &RecallQuery) -> Result<Vec<f32>> {
        let notes = query.notes.trim();
        let prompt = query.tags.to_prompt();
        let text = if notes.is_empty() {
            prompt
        } else if prompt.is_empty() {
            notes.to_string()
        } else {
            format!("{}. {}", notes, prompt)
        };
        self.embedder.embed_text(&text).await
    }

    fn score_asset(
        &self,
        asset: &Asset,
        query: &RecallQuery,
        strategy: RankStrategy,
        fuzziness: f32,
        query_embedding: Option<&[f32]>,
    ) -> ScoredAsset {
        let tag_overlap = query.tags.overlap(&asset.metadata.global_tags);
        let (vector, vector_space) = match query_embedding {
            Some(qv) => vector_score(qv, &asset.metadata.embeddings),
            None => (0.0, None),
        };

        let score = match strategy {
            RankStrategy::TagOnly => tag_overlap.score,
            RankStrategy::VectorOnly | RankStrategy::FilterThenRank => vector,
            RankStrategy::Hybrid => fuzziness * vector + (1.0 - fuzziness) * tag_overlap.score,
        };

        ScoredAsset {
            asset_id: asset.id,
            score,
            trust: asset.metadata.trust_score,
            created_at: asset.created_at,
            tag_overlap,
            vector,
            vector_space,
        }
    }

    /// Minimum score a candidate must clear to enter the result set.
    ///
    /// Interpolating the vector threshold by fuzziness keeps the HYBRID
    /// degeneracy exact: at fuzziness 0 the bar collapses to "any tag
    /// overlap", matching TAG_ONLY; at fuzziness 1 it equals the vector
    /// threshold, matching VECTOR_ONLY.
    fn entry_threshold(&self, strategy: RankStrategy, fuzziness: f32, widened: bool) -> f32 {
        let vector_threshold = if widened {
            self.config.widened_threshold
        } else {
            self.config.similarity_threshold
        };
        match strategy {
            RankStrategy::TagOnly => 0.0,
            RankStrategy::VectorOnly | RankStrategy::FilterThenRank => vector_threshold,
            RankStrategy::Hybrid => fuzziness * vector_threshold,
        }
    }

    /// Indices of assets that clear the entry threshold (and, for
    /// FILTER_THEN_RANK, the hard tag filter, which never widens).
    fn filter(&self, scored: &[ScoredAsset], strategy: RankStrategy, threshold: f32) -> Vec<usize> {
        scored
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                if strategy == RankStrategy::FilterThenRank
                    && s.tag_overlap.score < self.config.min_tag_overlap
                {
                    return false;
                }
                s.score > threshold
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Order: score descending; ties within epsilon broken by higher trust,
    /// then more recent creation, then asset id for a total order.
    fn sort(&self, indices: &mut [usize], scored: &[ScoredAsset]) {
        let epsilon = self.config.score_epsilon;
        indices.sort_by(|&a, &b| {
            let (sa, sb) = (&scored[a], &scored[b]);
            if (sa.score - sb.score).abs() <= epsilon {
                sb.trust
                    .partial_cmp(&sa.trust)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| sb.created_at.cmp(&sa.created_at))
                    .then_with(|| sa.asset_id.cmp(&sb.asset_id))
            } else {
                sb.score
                    .partial_cmp(&sa.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotlist_core::tags::{TagCategory, TagVector};
    use shotlist_core::ProcessingStatus;
    use shotlist_inference::MockEmbeddingBackend;
    use shotlist_store::InMemoryAssetStore;
    use uuid::Uuid;

    const QUERY_TEXT: &str = "a rooftop chase at night";
    /// Exact embedding input `embed_query` composes from the query below.
    const EMBED_TEXT: &str = "a rooftop chase at night. scene_type: chase, time_of_day: night";

    /// Build an eligible asset with pinned tag weights and an embedding that
    /// has the given cosine similarity against the pinned query vector
    /// [1, 0, 0].
    async fn add_asset(
        store: &InMemoryAssetStore,
        tags: TagVector,
        similarity: f32,
        trust: f32,
    ) -> Uuid {
        let mut asset = Asset::new(Uuid::new_v4(), "/media/clip.mp4", "video/mp4");
        asset.metadata.processing_status = ProcessingStatus::Done;
        asset.metadata.global_tags = tags;
        asset.metadata.trust_score = trust;
        // Description space has weight 1.0 so cosine == vector score.
        asset.metadata.embeddings.insert(
            EmbeddingSpace::Description,
            vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt(), 0.0],
        );
        let id = asset.id;
        store.create(asset).await.unwrap();
        id
    }

    fn engine(store: Arc<InMemoryAssetStore>) -> RankingEngine<InMemoryAssetStore> {
        let embedder = Arc::new(
            MockEmbeddingBackend::with_dimension(3)
                .with_mapping(EMBED_TEXT, vec![1.0, 0.0, 0.0]),
        );
        RankingEngine::new(store, embedder, RankConfig::default())
    }

    fn query() -> RecallQuery {
        RecallQuery::new("scene-1")
            .with_notes(QUERY_TEXT)
            .with_tags(
                TagVector::new()
                    .with(TagCategory::SceneType, "chase", 1.0)
                    .with(TagCategory::TimeOfDay, "night", 0.8),
            )
    }

    fn chase_tags() -> TagVector {
        TagVector::new()
            .with(TagCategory::SceneType, "chase", 1.0)
            .with(TagCategory::TimeOfDay, "night", 1.0)
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_placeholder() {
        let store = Arc::new(InMemoryAssetStore::new());
        let engine = engine(store);
        let set = engine
            .recall(&query(), RankStrategy::Hybrid)
            .await
            .unwrap();
        assert!(!set.has_match);
        assert!(set.candidates.is_empty());
        assert!(!set.placeholder_message.as_deref().unwrap().is_empty());
        assert_eq!(set.total_searched, 0);
    }

    #[tokio::test]
    async fn test_limit_and_monotonic_scores() {
        let store = Arc::new(InMemoryAssetStore::new());
        for i in 0..8 {
            add_asset(&store, chase_tags(), 0.4 + 0.05 * i as f32, 0.5).await;
        }
        let engine = engine(store);
        let set = engine
            .recall(&query().with_limit(5), RankStrategy::VectorOnly)
            .await
            .unwrap();
        assert!(set.has_match);
        assert_eq!(set.candidates.len(), 5);
        assert!(set.is_well_formed());
        assert_eq!(set.total_searched, 8);
    }

    #[tokio::test]
    async fn test_tag_only_ignores_vectors() {
        let store = Arc::new(InMemoryAssetStore::new());
        // Great vector, no tags
        add_asset(&store, TagVector::new(), 0.99, 0.5).await;
        // No vector signal, strong tags
        let tagged = add_asset(&store, chase_tags(), 0.0, 0.5).await;

        let engine = engine(store);
        let set = engine.recall(&query(), RankStrategy::TagOnly).await.unwrap();
        assert_eq!(set.candidates.len(), 1);
        assert_eq!(set.candidates[0].asset_id, tagged);
        assert!(!set.candidates[0].matched_tags.is_empty());
    }

    #[tokio::test]
    async fn test_filter_then_rank_hard_filter_invariant() {
        let store = Arc::new(InMemoryAssetStore::new());
        // Excellent vector match but zero tag overlap: must never appear.
        let untagged = add_asset(&store, TagVector::new(), 0.95, 0.9).await;
        let weak_tagged = add_asset(
            &store,
            TagVector::new().with(TagCategory::SceneType, "chase", 0.1),
            0.9,
            0.5,
        )
        .await;
        let survivor = add_asset(&store, chase_tags(), 0.6, 0.5).await;

        let engine = engine(store);
        let set = engine
            .recall(&query(), RankStrategy::FilterThenRank)
            .await
            .unwrap();
        let ids: Vec<Uuid> = set.candidates.iter().map(|c| c.asset_id).collect();
        assert!(ids.contains(&survivor));
        assert!(!ids.contains(&untagged));
        assert!(!ids.contains(&weak_tagged));
    }

    #[tokio::test]
    async fn test_hybrid_degenerates_to_tag_only_at_zero() {
        let store = Arc::new(InMemoryAssetStore::new());
        add_asset(&store, chase_tags(), 0.9, 0.4).await;
        add_asset(
            &store,
            TagVector::new().with(TagCategory::SceneType, "chase", 0.7),
            0.5,
            0.6,
        )
        .await;
        add_asset(
            &store,
            TagVector::new().with(TagCategory::TimeOfDay, "night", 0.5),
            0.2,
            0.8,
        )
        .await;

        let engine = engine(store);
        let tag_only = engine.recall(&query(), RankStrategy::TagOnly).await.unwrap();
        let hybrid = engine
            .recall(&query().with_fuzziness(0.0), RankStrategy::Hybrid)
            .await
            .unwrap();

        let order = |s: &CandidateSet| s.candidates.iter().map(|c| c.asset_id).collect::<Vec<_>>();
        assert_eq!(order(&tag_only), order(&hybrid));
    }

    #[tokio::test]
    async fn test_hybrid_degenerates_to_vector_only_at_one() {
        let store = Arc::new(InMemoryAssetStore::new());
        add_asset(&store, chase_tags(), 0.45, 0.4).await;
        add_asset(&store, TagVector::new(), 0.8, 0.6).await;
        add_asset(
            &store,
            TagVector::new().with(TagCategory::SceneType, "chase", 0.7),
            0.6,
            0.8,
        )
        .await;

        let engine = engine(store);
        let vector_only = engine
            .recall(&query(), RankStrategy::VectorOnly)
            .await
            .unwrap();
        let hybrid = engine
            .recall(&query().with_fuzziness(1.0), RankStrategy::Hybrid)
            .await
            .unwrap();

        let order = |s: &CandidateSet| s.candidates.iter().map(|c| c.asset_id).collect::<Vec<_>>();
        assert_eq!(order(&vector_only), order(&hybrid));
    }

    #[tokio::test]
    async fn test_fuzziness_out_of_range_is_clamped() {
        let store = Arc::new(InMemoryAssetStore::new());
        add_asset(&store, chase_tags(), 0.8, 0.5).await;
        let engine = engine(store);

        let clamped = engine
            .recall(&query().with_fuzziness(3.7), RankStrategy::Hybrid)
            .await
            .unwrap();
        let exact = engine
            .recall(&query().with_fuzziness(1.0), RankStrategy::Hybrid)
            .await
            .unwrap();
        assert_eq!(clamped.candidates[0].score, exact.candidates[0].score);
    }

    #[tokio::test]
    async fn test_tie_break_by_trust() {
        let store = Arc::new(InMemoryAssetStore::new());
        // Same tags, same vectors, different trust.
        let low = add_asset(&store, chase_tags(), 0.5, 0.2).await;
        let high = add_asset(&store, chase_tags(), 0.5, 0.9).await;

        let engine = engine(store);
        let set = engine.recall(&query(), RankStrategy::TagOnly).await.unwrap();
        assert_eq!(set.candidates[0].asset_id, high);
        assert_eq!(set.candidates[1].asset_id, low);
    }

    #[tokio::test]
    async fn test_widening_pass_marks_degraded() {
        let store = Arc::new(InMemoryAssetStore::new());
        // Similarity between widened (0.15) and normal (0.3) thresholds.
        add_asset(&store, TagVector::new(), 0.2, 0.5).await;
        let engine = engine(store);
        let set = engine
            .recall(&query(), RankStrategy::VectorOnly)
            .await
            .unwrap();
        assert!(set.has_match);
        assert!(set.degraded);
        assert_eq!(set.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_below_widened_threshold_yields_empty() {
        let store = Arc::new(InMemoryAssetStore::new());
        add_asset(&store, TagVector::new(), 0.05, 0.5).await;
        let engine = engine(store);
        let set = engine
            .recall(&query(), RankStrategy::VectorOnly)
            .await
            .unwrap();
        assert!(!set.has_match);
        assert!(!set.degraded);
        assert!(set.placeholder_message.is_some());
        assert_eq!(set.total_searched, 1);
    }

    #[tokio::test]
    async fn test_invalid_query_rejected() {
        let store = Arc::new(InMemoryAssetStore::new());
        let engine = engine(store);
        let err = engine
            .recall(&RecallQuery::new("scene-1"), RankStrategy::Hybrid)
            .await
            .unwrap_err();
        assert!(matches!(err, shotlist_core::Error::Validation(_)));
    }
}

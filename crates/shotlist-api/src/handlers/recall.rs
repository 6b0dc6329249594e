//! Recall and candidate-cache handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use shotlist_core::tags::TagVector;
use shotlist_core::{CandidateSet, RecallQuery};
use shotlist_rank::{query_fingerprint, RankStrategy};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    pub query_key: String,
    #[serde(default)]
    pub tags: TagVector,
    #[serde(default)]
    pub notes: String,
    pub fuzziness: Option<f32>,
    pub limit: Option<usize>,
    pub strategy: Option<RankStrategy>,
}

#[derive(Debug, Serialize)]
pub struct RecallResponse {
    #[serde(flatten)]
    pub set: CandidateSet,
    /// True when the set was served from the candidate cache without a
    /// ranking computation.
    pub cached: bool,
}

/// `POST /api/v1/recall` — score and rank eligible assets against a shot
/// description. An unexpired cache entry for the same query key and an
/// unchanged query is returned as-is.
pub async fn recall(
    State(state): State<AppState>,
    Json(req): Json<RecallRequest>,
) -> Result<Json<RecallResponse>, ApiError> {
    let mut query = RecallQuery::new(req.query_key)
        .with_tags(req.tags)
        .with_notes(req.notes);
    if let Some(fuzziness) = req.fuzziness {
        query = query.with_fuzziness(fuzziness);
    }
    if let Some(limit) = req.limit {
        query = query.with_limit(limit);
    }
    let strategy = req.strategy.unwrap_or_default();

    query.validate()?;
    let fingerprint = query_fingerprint(&query, strategy);

    if let Some(set) = state.cache.fresh(&query.query_key, &fingerprint).await {
        debug!(query_key = %set.query_key, "Serving recall from cache");
        return Ok(Json(RecallResponse { set, cached: true }));
    }

    let set = state.engine.recall(&query, strategy).await?;
    state.cache.insert(set.clone()).await;
    info!(
        query_key = %set.query_key,
        candidates = set.candidates.len(),
        degraded = set.degraded,
        "Recall computed"
    );
    Ok(Json(RecallResponse { set, cached: false }))
}

#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub query_key: String,
    /// The rank the caller believes is active; rejects stale switches.
    pub from_rank: usize,
    pub to_rank: usize,
}

/// `POST /api/v1/candidates/switch` — move the active-candidate pointer for
/// a cached set. Never triggers a ranking computation.
pub async fn switch_candidate(
    State(state): State<AppState>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<CandidateSet>, ApiError> {
    let set = state
        .cache
        .switch(&req.query_key, req.from_rank, req.to_rank)
        .await?;
    Ok(Json(set))
}

/// `GET /api/v1/candidates/:query_key` — the cached candidate set, if one is
/// live for the key.
pub async fn get_candidates(
    State(state): State<AppState>,
    Path(query_key): Path<String>,
) -> Result<Json<CandidateSet>, ApiError> {
    let set = state.cache.get(&query_key).await?;
    Ok(Json(set))
}

//! Feedback recording handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shotlist_core::FeedbackType;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub asset_id: Uuid,
    pub feedback_type: FeedbackType,
    /// Query key of the recall that exposed the candidate.
    pub query_key: Option<String>,
    /// Full query context string; defaults to the query key.
    pub context: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub asset_id: Uuid,
    pub feedback_id: Uuid,
    pub trust_score: f32,
}

/// `POST /api/v1/feedback` — append a feedback event to the asset's history
/// and move its trust score.
pub async fn record_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let context = req
        .context
        .or(req.query_key)
        .ok_or_else(|| ApiError::validation("feedback requires a query_key or context"))?;

    let record = state
        .feedback
        .record_feedback(req.asset_id, req.feedback_type, context, req.reason)
        .await?;
    let trust_score = state.feedback.trust_score(req.asset_id).await?;

    Ok(Json(FeedbackResponse {
        asset_id: req.asset_id,
        feedback_id: record.id,
        trust_score,
    }))
}

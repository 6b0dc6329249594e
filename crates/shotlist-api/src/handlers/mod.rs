//! HTTP handlers, grouped by resource.

pub mod assets;
pub mod feedback;
pub mod recall;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use shotlist_core::AssetRepository;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /health` — liveness plus a few cheap gauges.
pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let live_assets = state.assets.live_count().await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "live_assets": live_assets,
        "cached_queries": state.cache.len().await,
        "pending_ingests": state.queue.pending_count(),
    })))
}

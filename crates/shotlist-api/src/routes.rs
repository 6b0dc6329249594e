//! Router assembly and middleware stack.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Request};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Maximum accepted request body, sized for media uploads.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// UUIDv7 request ids: time-ordered, so request logs sort chronologically.
#[derive(Clone, Copy, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/assets", post(handlers::assets::upload_asset))
        .route("/api/v1/assets/:id/status", get(handlers::assets::asset_status))
        .route(
            "/api/v1/assets/:id/reprocess",
            post(handlers::assets::reprocess_asset),
        )
        .route("/api/v1/assets/:id", delete(handlers::assets::delete_asset))
        .route("/api/v1/assets/:id/trust", get(handlers::assets::asset_trust))
        .route("/api/v1/recall", post(handlers::recall::recall))
        .route(
            "/api/v1/candidates/switch",
            post(handlers::recall::switch_candidate),
        )
        .route(
            "/api/v1/candidates/:query_key",
            get(handlers::recall::get_candidates),
        )
        .route("/api/v1/feedback", post(handlers::feedback::record_feedback))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

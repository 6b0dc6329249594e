//! Asset lifecycle handlers: upload, status polling, reprocess, delete,
//! trust inspection.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use shotlist_core::{
    defaults, Asset, AssetRepository, Error, IngestTask, StageKind, StageState, TaskRepository,
};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub asset_id: Uuid,
    pub status: String,
    pub estimated_processing_secs: u64,
}

fn accepted_response(asset_id: Uuid) -> (StatusCode, Json<UploadResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            asset_id,
            status: "pending".into(),
            estimated_processing_secs: StageKind::ordered().len() as u64
                * defaults::STAGE_ESTIMATE_SECS,
        }),
    )
}

/// `POST /api/v1/assets` — multipart upload. Accepts a `file` part and an
/// optional `project_id` part; responds 202 and queues the ingestion chain.
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_name: Option<String> = None;
    let mut declared_mime: Option<String> = None;
    let mut media: Option<Vec<u8>> = None;
    let mut project_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                file_name = field.file_name().map(String::from);
                declared_mime = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("failed to read file part: {}", e)))?;
                media = Some(bytes.to_vec());
            }
            Some("project_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("bad project_id part: {}", e)))?;
                project_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::validation("project_id must be a UUID"))?,
                );
            }
            _ => {}
        }
    }

    let media = media.ok_or_else(|| ApiError::validation("missing 'file' part"))?;
    if media.is_empty() {
        return Err(ApiError::validation("uploaded file is empty"));
    }

    // Sniff the real type from the bytes; the declared content type is only
    // a fallback.
    let mime_type = infer::get(&media)
        .map(|t| t.mime_type().to_string())
        .or(declared_mime)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let media_path = file_name.unwrap_or_else(|| "upload.bin".to_string());
    let asset = Asset::new(project_id.unwrap_or_else(Uuid::new_v4), media_path, mime_type);
    let asset_id = asset.id;

    state.assets.create(asset).await?;
    state.tasks.create(IngestTask::new(asset_id)).await?;

    let media = Arc::new(media);
    state.blobs.put(asset_id, media.clone()).await;
    state.queue.enqueue(asset_id, media).await?;

    info!(asset_id = %asset_id, "Accepted upload");
    Ok(accepted_response(asset_id))
}

#[derive(Debug, Serialize)]
pub struct StageView {
    pub stage: StageKind,
    #[serde(flatten)]
    pub state: StageState,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub asset_id: Uuid,
    pub processing_status: String,
    pub task_status: String,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub stages: Vec<StageView>,
}

/// `GET /api/v1/assets/:id/status` — pull-based progress for the ingestion
/// chain.
pub async fn asset_status(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let asset = state.assets.get(asset_id).await?;
    let task = state.tasks.get_by_asset(asset_id).await?;

    let stages = StageKind::ordered()
        .into_iter()
        .map(|kind| StageView {
            stage: kind,
            state: asset.metadata.stage(kind),
        })
        .collect();

    Ok(Json(StatusResponse {
        asset_id,
        processing_status: asset.metadata.processing_status.to_string(),
        task_status: task.status.to_string(),
        progress_percent: task.progress_percent,
        progress_message: task.progress_message,
        error_message: task.error_message,
        stages,
    }))
}

/// `POST /api/v1/assets/:id/reprocess` — reset pipeline state and re-run the
/// chain on the stored media. Trust score and feedback history survive.
pub async fn reprocess_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let asset = state.assets.get(asset_id).await?;
    if asset.deleted {
        return Err(ApiError(Error::AssetNotFound(asset_id)));
    }

    let media = state.blobs.get(asset_id).await?;

    // Atomic reset: feedback landing concurrently is preserved.
    state
        .assets
        .mutate_metadata(asset_id, |metadata| metadata.reset_for_reprocess())
        .await?;

    // A fresh task record; the previous terminal record is replaced.
    state.tasks.create(IngestTask::new(asset_id)).await?;

    // Recall results computed against the old extraction are no longer valid.
    state.cache.invalidate_all().await;

    state.queue.enqueue(asset_id, media).await?;
    info!(asset_id = %asset_id, "Queued reprocess");
    Ok(accepted_response(asset_id))
}

/// `DELETE /api/v1/assets/:id` — cancel any in-flight ingestion and
/// soft-delete the asset.
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.queue.cancel(asset_id).await;
    state.assets.soft_delete(asset_id).await?;
    state.blobs.remove(asset_id).await;
    state.cache.invalidate_all().await;
    info!(asset_id = %asset_id, "Soft-deleted asset");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct TrustResponse {
    pub asset_id: Uuid,
    pub trust_score: f32,
    pub feedback_events: usize,
}

/// `GET /api/v1/assets/:id/trust` — current trust score and history size.
pub async fn asset_trust(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> Result<Json<TrustResponse>, ApiError> {
    let asset = state.assets.get(asset_id).await?;
    Ok(Json(TrustResponse {
        asset_id,
        trust_score: asset.metadata.trust_score,
        feedback_events: asset.metadata.feedback_history.len(),
    }))
}

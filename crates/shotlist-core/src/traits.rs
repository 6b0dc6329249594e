//! Repository trait definitions.
//!
//! Stores are kept behind traits so the in-process implementations in
//! `shotlist-store` can be swapped for a database-backed index without
//! touching the pipeline, ranking engine, or API layers.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Asset, AssetMetadata, IngestTask, ProcessingStatus, TaskStatus};
use crate::Result;

/// Storage for assets and their extracted metadata.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Persist a new asset. Fails if the id already exists.
    async fn create(&self, asset: Asset) -> Result<()>;

    /// Fetch an asset by id. Soft-deleted assets are still returned; callers
    /// filter on `deleted` where it matters.
    async fn get(&self, asset_id: Uuid) -> Result<Asset>;

    /// Replace an asset's metadata wholesale. Only safe when the caller is
    /// the sole writer; concurrent writers use `mutate_metadata`.
    async fn update_metadata(&self, asset_id: Uuid, metadata: AssetMetadata) -> Result<()>;

    /// Atomically read-modify-write an asset's metadata. The closure runs
    /// inside the store's write critical section, so two mutators can never
    /// overwrite each other's fields. Returns the asset after the mutation.
    async fn mutate_metadata<F>(&self, asset_id: Uuid, mutate: F) -> Result<Asset>
    where
        F: FnOnce(&mut AssetMetadata) + Send;

    /// Set the thumbnail locator produced by the proxy stage.
    async fn set_thumbnail(&self, asset_id: Uuid, thumbnail_path: String) -> Result<()>;

    /// Transition the overall processing status, enforcing monotonicity.
    async fn set_processing_status(&self, asset_id: Uuid, status: ProcessingStatus) -> Result<()>;

    /// All live assets eligible for recall (status done, at least one
    /// embedding space, not soft-deleted).
    async fn list_recall_eligible(&self) -> Result<Vec<Asset>>;

    /// Number of live (non-deleted) assets.
    async fn live_count(&self) -> Result<usize>;

    /// Soft-delete an asset. The record survives for scene selections.
    async fn soft_delete(&self, asset_id: Uuid) -> Result<()>;
}

/// Storage for ingestion task progress records.
///
/// Progress is pull-based: callers poll at their own cadence, and the record
/// advances monotonically while the task runs.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Register a new task for an asset.
    async fn create(&self, task: IngestTask) -> Result<()>;

    /// Fetch a task by asset id.
    async fn get_by_asset(&self, asset_id: Uuid) -> Result<IngestTask>;

    /// Advance progress. Regressions in percent are ignored so observers
    /// never see progress move backwards.
    async fn update_progress(
        &self,
        asset_id: Uuid,
        percent: u8,
        message: Option<String>,
    ) -> Result<()>;

    /// Move the task to a new status. Terminal states are sticky.
    async fn set_status(
        &self,
        asset_id: Uuid,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> Result<()>;
}

//! In-memory asset index.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shotlist_core::{
    Asset, AssetMetadata, AssetRepository, Error, ProcessingStatus, Result,
};

/// Asset repository backed by an in-process map.
#[derive(Clone, Default)]
pub struct InMemoryAssetStore {
    inner: Arc<RwLock<HashMap<Uuid, Asset>>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetStore {
    async fn create(&self, asset: Asset) -> Result<()> {
        let mut assets = self.inner.write().await;
        if assets.contains_key(&asset.id) {
            return Err(Error::Validation(format!(
                "asset {} already exists",
                asset.id
            )));
        }
        debug!(asset_id = %asset.id, mime = %asset.mime_type, "Created asset");
        assets.insert(asset.id, asset);
        Ok(())
    }

    async fn get(&self, asset_id: Uuid) -> Result<Asset> {
        self.inner
            .read()
            .await
            .get(&asset_id)
            .cloned()
            .ok_or(Error::AssetNotFound(asset_id))
    }

    async fn update_metadata(&self, asset_id: Uuid, metadata: AssetMetadata) -> Result<()> {
        let mut assets = self.inner.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        asset.metadata = metadata;
        Ok(())
    }

    async fn mutate_metadata<F>(&self, asset_id: Uuid, mutate: F) -> Result<Asset>
    where
        F: FnOnce(&mut AssetMetadata) + Send,
    {
        let mut assets = self.inner.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        mutate(&mut asset.metadata);
        Ok(asset.clone())
    }

    async fn set_thumbnail(&self, asset_id: Uuid, thumbnail_path: String) -> Result<()> {
        let mut assets = self.inner.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        asset.thumbnail_path = Some(thumbnail_path);
        Ok(())
    }

    async fn set_processing_status(
        &self,
        asset_id: Uuid,
        status: ProcessingStatus,
    ) -> Result<()> {
        let mut assets = self.inner.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        let current = asset.metadata.processing_status;
        if !current.can_transition_to(status) {
            warn!(
                asset_id = %asset_id,
                from = %current,
                to = %status,
                "Rejected non-monotonic status transition"
            );
            return Err(Error::Consistency(format!(
                "cannot move asset {} from {} to {}",
                asset_id, current, status
            )));
        }
        asset.metadata.processing_status = status;
        Ok(())
    }

    async fn list_recall_eligible(&self) -> Result<Vec<Asset>> {
        let assets = self.inner.read().await;
        let mut eligible: Vec<Asset> = assets
            .values()
            .filter(|a| a.is_recall_eligible())
            .cloned()
            .collect();
        // Stable order for deterministic downstream scoring
        eligible.sort_by_key(|a| (a.created_at, a.id));
        Ok(eligible)
    }

    async fn live_count(&self) -> Result<usize> {
        Ok(self.inner.read().await.values().filter(|a| !a.deleted).count())
    }

    async fn soft_delete(&self, asset_id: Uuid) -> Result<()> {
        let mut assets = self.inner.write().await;
        let asset = assets
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        asset.deleted = true;
        debug!(asset_id = %asset_id, "Soft-deleted asset");
        Ok(())
    }
}

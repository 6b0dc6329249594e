//! In-memory media blob store.
//!
//! Holds the raw uploaded bytes per asset so reprocessing can re-run the
//! pipeline without a re-upload. Blobs are dropped when an asset is deleted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use shotlist_core::{Error, Result};

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Vec<u8>>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, asset_id: Uuid, media: Arc<Vec<u8>>) {
        self.inner.write().await.insert(asset_id, media);
    }

    pub async fn get(&self, asset_id: Uuid) -> Result<Arc<Vec<u8>>> {
        self.inner
            .read()
            .await
            .get(&asset_id)
            .cloned()
            .ok_or(Error::AssetNotFound(asset_id))
    }

    pub async fn remove(&self, asset_id: Uuid) {
        self.inner.write().await.remove(&asset_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_remove() {
        let store = InMemoryBlobStore::new();
        let id = Uuid::new_v4();
        store.put(id, Arc::new(vec![1, 2, 3])).await;
        assert_eq!(store.get(id).await.unwrap().as_slice(), &[1, 2, 3]);
        assert_eq!(store.len().await, 1);

        store.remove(id).await;
        assert!(matches!(
            store.get(id).await,
            Err(Error::AssetNotFound(_))
        ));
        assert!(store.is_empty().await);
    }
}

//! In-memory ingestion task registry.
//!
//! Holds one monotonically advancing progress record per ingestion chain.
//! Status observation is pull-based; callers poll at their own cadence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shotlist_core::{Error, IngestTask, Result, TaskRepository, TaskStatus};

/// Task repository backed by an in-process map keyed by asset id.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    inner: Arc<RwLock<HashMap<Uuid, IngestTask>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskStore {
    async fn create(&self, task: IngestTask) -> Result<()> {
        let mut tasks = self.inner.write().await;
        debug!(task_id = %task.id, asset_id = %task.asset_id, "Registered ingest task");
        tasks.insert(task.asset_id, task);
        Ok(())
    }

    async fn get_by_asset(&self, asset_id: Uuid) -> Result<IngestTask> {
        self.inner
            .read()
            .await
            .get(&asset_id)
            .cloned()
            .ok_or(Error::AssetNotFound(asset_id))
    }

    async fn update_progress(
        &self,
        asset_id: Uuid,
        percent: u8,
        message: Option<String>,
    ) -> Result<()> {
        let mut tasks = self.inner.write().await;
        let task = tasks
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        // Progress never moves backwards from an observer's point of view.
        if percent > task.progress_percent {
            task.progress_percent = percent.min(100);
        }
        if message.is_some() {
            task.progress_message = message;
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(
        &self,
        asset_id: Uuid,
        status: TaskStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut tasks = self.inner.write().await;
        let task = tasks
            .get_mut(&asset_id)
            .ok_or(Error::AssetNotFound(asset_id))?;
        if task.status.is_terminal() && task.status != status {
            return Err(Error::Consistency(format!(
                "task for asset {} is already {} and cannot move to {}",
                asset_id, task.status, status
            )));
        }
        task.status = status;
        if error_message.is_some() {
            task.error_message = error_message;
        }
        if status == TaskStatus::Succeeded {
            task.progress_percent = 100;
        }
        task.updated_at = Utc::now();
        Ok(())
    }
}

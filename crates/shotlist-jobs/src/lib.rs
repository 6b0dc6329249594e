//! # shotlist-jobs
//!
//! Background ingestion pipeline for shotlist.
//!
//! This crate provides:
//! - The ordered stage chain (proxy, transcript, embedding) with per-stage
//!   retry, timeout and checkpoint resume
//! - A bounded-concurrency worker draining an in-process queue
//! - Cooperative cancellation and progress notifications via broadcast
//!   channels
//!
//! ## Example
//!
//! ```ignore
//! use shotlist_jobs::{IngestPipeline, IngestWorker, PipelineConfig, WorkerConfig};
//! use shotlist_jobs::stages::{EmbeddingStage, ProxyStage, TranscriptStage};
//!
//! let pipeline = IngestPipeline::new(assets.clone(), tasks.clone(), PipelineConfig::from_env())
//!     .register(ProxyStage::new(assets.clone()))
//!     .register(TranscriptStage::new(assets.clone(), transcriber))
//!     .register(EmbeddingStage::new(assets.clone(), embedder));
//!
//! let worker = IngestWorker::new(Arc::new(pipeline), WorkerConfig::from_env());
//! let queue = worker.queue();
//! let handle = worker.start();
//!
//! queue.enqueue(asset_id, media).await?;
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod handler;
pub mod pipeline;
pub mod stages;
pub mod worker;

pub use handler::{StageContext, StageHandler, StageOutcome};
pub use pipeline::{IngestPipeline, PipelineConfig};
pub use stages::{EmbeddingStage, ProxyStage, TranscriptStage};
pub use worker::{IngestQueue, IngestRequest, IngestWorker, WorkerConfig, WorkerEvent, WorkerHandle};

//! # shotlist-store
//!
//! In-process implementations of the shotlist repositories plus the trust &
//! feedback engine. The asset index and task registry live behind the
//! `shotlist-core` traits so they can later be backed by a database without
//! touching callers.

pub mod assets;
pub mod blobs;
pub mod feedback;
pub mod tasks;

pub use assets::InMemoryAssetStore;
pub use blobs::InMemoryBlobStore;
pub use feedback::{FeedbackEngine, TrustConfig};
pub use tasks::InMemoryTaskStore;

//! Concrete pipeline stage handlers.

pub mod embedding;
pub mod proxy;
pub mod transcript;

pub use embedding::EmbeddingStage;
pub use proxy::ProxyStage;
pub use transcript::TranscriptStage;

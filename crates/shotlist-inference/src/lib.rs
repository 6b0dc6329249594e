//! # shotlist-inference
//!
//! Uniform capability interface over whatever external models produce text
//! and visual embeddings and time-aligned transcripts. The rest of the
//! system only sees the [`EmbeddingBackend`] and
//! [`transcription::TranscriptionBackend`] traits; concrete backends
//! (Ollama-compatible embedding servers, OpenAI-compatible Whisper servers)
//! are wired in at startup.

pub mod config;
pub mod mock;
pub mod ollama;
pub mod transcription;

use async_trait::async_trait;
use shotlist_core::Result;

/// Backend capable of producing embeddings for text and images.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a text into a vector.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed an image into a vector in the same space family.
    async fn embed_image(&self, image_data: &[u8], mime_type: &str) -> Result<Vec<f32>>;

    /// Dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// Model name, for logging and diagnostics.
    fn model_name(&self) -> &str;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<bool>;
}

pub use config::InferenceConfig;
pub use mock::{MockEmbeddingBackend, MockTranscriptionBackend};
pub use ollama::OllamaBackend;
pub use transcription::{TranscriptionBackend, TranscriptionResult, TranscriptionSegment};

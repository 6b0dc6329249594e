//! Mock backends for deterministic testing.
//!
//! The mock embedding backend derives vectors from a content hash, so the
//! same input always produces the same vector, without any external service.
//! Failure injection lets pipeline tests exercise retry and partial-failure
//! paths deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use shotlist_core::{Error, Result};

use crate::transcription::{TranscriptionBackend, TranscriptionResult, TranscriptionSegment};
use crate::EmbeddingBackend;

/// Mock embedding backend for testing.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    /// Explicit text → vector mappings, consulted before hash derivation.
    mappings: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    /// Number of upcoming embed calls that should fail.
    fail_next: Arc<AtomicU32>,
    call_log: Arc<Mutex<Vec<String>>>,
}

impl MockEmbeddingBackend {
    /// Create a new mock backend with the default dimension.
    pub fn new() -> Self {
        Self::with_dimension(shotlist_core::defaults::EMBED_DIMENSION)
    }

    /// Create a mock backend producing vectors of the given dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            mappings: Arc::new(Mutex::new(HashMap::new())),
            fail_next: Arc::new(AtomicU32::new(0)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pin an exact vector for a specific input text.
    pub fn with_mapping(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.mappings.lock().unwrap().insert(text.into(), vector);
        self
    }

    /// Make the next `n` embed calls fail with an external-service error.
    pub fn fail_next_embeds(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Inputs seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of embed calls made.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    fn derive_vector(&self, input: &str) -> Vec<f32> {
        if let Some(v) = self.mappings.lock().unwrap().get(input) {
            return v.clone();
        }

        // Hash-seeded xorshift keeps the vector deterministic per input.
        let digest = Sha256::digest(input.as_bytes());
        let mut state = u64::from_le_bytes(digest[0..8].try_into().unwrap()) | 1;
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            vector.push(((state % 2000) as f32 / 1000.0) - 1.0);
        }

        // L2-normalize so cosine comparisons behave like real embeddings.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.call_log.lock().unwrap().push(text.to_string());
        if self.take_failure() {
            return Err(Error::ExternalService("mock embed failure".into()));
        }
        Ok(self.derive_vector(text))
    }

    async fn embed_image(&self, image_data: &[u8], mime_type: &str) -> Result<Vec<f32>> {
        let key = format!("image:{}:{:x}", mime_type, Sha256::digest(image_data));
        self.call_log.lock().unwrap().push(key.clone());
        if self.take_failure() {
            return Err(Error::ExternalService("mock embed failure".into()));
        }
        Ok(self.derive_vector(&key))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Mock transcription backend for testing.
#[derive(Clone)]
pub struct MockTranscriptionBackend {
    result: TranscriptionResult,
    fail_next: Arc<AtomicU32>,
    /// When set, every call fails. Used for the partial-failure policy tests.
    always_fail: bool,
}

impl MockTranscriptionBackend {
    /// Create a mock returning a small fixed transcript.
    pub fn new() -> Self {
        Self {
            result: TranscriptionResult {
                full_text: "two figures run across the rooftop".to_string(),
                segments: vec![
                    TranscriptionSegment {
                        start_secs: 0.0,
                        end_secs: 4.0,
                        text: "two figures run".to_string(),
                    },
                    TranscriptionSegment {
                        start_secs: 4.0,
                        end_secs: 9.5,
                        text: "across the rooftop".to_string(),
                    },
                ],
                language: Some("en".to_string()),
                duration_secs: Some(9.5),
            },
            fail_next: Arc::new(AtomicU32::new(0)),
            always_fail: false,
        }
    }

    /// Replace the fixed transcription result.
    pub fn with_result(mut self, result: TranscriptionResult) -> Self {
        self.result = result;
        self
    }

    /// A mock whose every call fails.
    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new()
        }
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }
}

impl Default for MockTranscriptionBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptionBackend for MockTranscriptionBackend {
    async fn transcribe(
        &self,
        _audio_data: &[u8],
        _mime_type: &str,
        _language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        if self.always_fail {
            return Err(Error::ExternalService("mock transcription down".into()));
        }
        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok();
        if should_fail {
            return Err(Error::ExternalService("mock transcription failure".into()));
        }
        Ok(self.result.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.always_fail)
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_deterministic() {
        let backend = MockEmbeddingBackend::with_dimension(32);
        let a = backend.embed_text("a chase at night").await.unwrap();
        let b = backend.embed_text("a chase at night").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let c = backend.embed_text("a quiet morning").await.unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_embed_normalized() {
        let backend = MockEmbeddingBackend::with_dimension(64);
        let v = backend.embed_text("anything").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_mapping_overrides_hash() {
        let backend =
            MockEmbeddingBackend::with_dimension(3).with_mapping("pinned", vec![1.0, 0.0, 0.0]);
        let v = backend.embed_text("pinned").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_fail_next_embeds() {
        let backend = MockEmbeddingBackend::new();
        backend.fail_next_embeds(2);
        assert!(backend.embed_text("one").await.is_err());
        assert!(backend.embed_text("two").await.is_err());
        assert!(backend.embed_text("three").await.is_ok());
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_transcription_mock() {
        let backend = MockTranscriptionBackend::new();
        let result = backend.transcribe(&[], "audio/wav", None).await.unwrap();
        assert_eq!(result.segments.len(), 2);

        backend.fail_next(1);
        assert!(backend.transcribe(&[], "audio/wav", None).await.is_err());
        assert!(backend.transcribe(&[], "audio/wav", None).await.is_ok());

        let broken = MockTranscriptionBackend::always_failing();
        assert!(broken.transcribe(&[], "audio/wav", None).await.is_err());
        assert!(!broken.health_check().await.unwrap());
    }
}

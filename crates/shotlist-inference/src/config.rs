//! Environment-driven configuration for inference backends.

use std::time::Duration;

use shotlist_core::defaults;

/// Configuration for the embedding backend.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the Ollama-compatible embedding server.
    pub base_url: String,
    /// Embedding model name.
    pub embed_model: String,
    /// Expected embedding dimension.
    pub dimension: usize,
    /// Timeout applied to every embedding request.
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OLLAMA_URL.to_string(),
            embed_model: defaults::EMBED_MODEL.to_string(),
            dimension: defaults::EMBED_DIMENSION,
            timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
        }
    }
}

impl InferenceConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `OLLAMA_URL` | `http://127.0.0.1:11434` | Embedding server base URL |
    /// | `EMBED_MODEL` | `nomic-embed-text` | Embedding model name |
    pub fn from_env() -> Self {
        let base_url = std::env::var(defaults::ENV_OLLAMA_URL)
            .unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let embed_model = std::env::var(defaults::ENV_EMBED_MODEL)
            .unwrap_or_else(|_| defaults::EMBED_MODEL.to_string());

        Self {
            base_url,
            embed_model,
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InferenceConfig::default();
        assert_eq!(config.base_url, defaults::OLLAMA_URL);
        assert_eq!(config.embed_model, defaults::EMBED_MODEL);
        assert_eq!(config.dimension, defaults::EMBED_DIMENSION);
    }

    #[test]
    fn test_builder_chaining() {
        let config = InferenceConfig::default()
            .with_base_url("http://embed.internal:11434")
            .with_model("mxbai-embed-large")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://embed.internal:11434");
        assert_eq!(config.embed_model, "mxbai-embed-large");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}

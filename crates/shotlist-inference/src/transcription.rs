//! Transcription backend traits and implementations for audio-to-text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shotlist_core::{defaults, Error, Result};

/// A segment of transcribed audio with timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Result of audio transcription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub full_text: String,
    /// Timestamped segments.
    pub segments: Vec<TranscriptionSegment>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Total audio duration in seconds.
    pub duration_secs: Option<f64>,
}

/// Backend for transcribing audio content.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe audio data.
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;

    /// Check if the transcription backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible Whisper backend (works with Speaches/faster-whisper-server).
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables.
    /// Returns None if `WHISPER_BASE_URL` is not set or empty.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| defaults::WHISPER_MODEL.to_string());
        Some(Self::new(base_url, model))
    }
}

/// OpenAI Whisper API response format.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        let ext = match mime_type {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/ogg" => "ogg",
            "audio/flac" => "flac",
            "audio/aac" => "aac",
            "audio/webm" | "video/webm" => "webm",
            "video/mp4" => "mp4",
            _ => "wav",
        };

        let file_part = reqwest::multipart::Part::bytes(audio_data.to_vec())
            .file_name(format!("audio.{}", ext))
            .mime_str(mime_type)
            .map_err(|e| Error::Transcription(format!("invalid mime type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("transcription request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "transcription server returned {}: {}",
                status, body
            )));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("invalid transcription response: {}", e)))?;

        let segments = parsed
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptionSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text.trim().to_string(),
            })
            .collect();

        Ok(TranscriptionResult {
            full_text: parsed.text,
            segments,
            language: parsed.language,
            duration_secs: parsed.duration,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_transcribe_parses_segments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello world",
                "segments": [
                    {"start": 0.0, "end": 1.5, "text": " hello "},
                    {"start": 1.5, "end": 3.0, "text": "world"}
                ],
                "language": "en",
                "duration": 3.0
            })))
            .mount(&server)
            .await;

        let backend = WhisperBackend::new(server.uri(), "whisper-1".into());
        let result = backend
            .transcribe(&[0u8; 16], "audio/wav", Some("en"))
            .await
            .unwrap();

        assert_eq!(result.full_text, "hello world");
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].text, "hello");
        assert_eq!(result.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_transcribe_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = WhisperBackend::new(server.uri(), "whisper-1".into());
        let err = backend
            .transcribe(&[0u8; 16], "audio/wav", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
    }

    #[test]
    fn test_model_name() {
        let backend = WhisperBackend::new("http://localhost".into(), "whisper-1".into());
        assert_eq!(backend.model_name(), "whisper-1");
    }
}

//! Centralized default constants for the shotlist system.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// TRUST & FEEDBACK
// =============================================================================

/// Baseline trust score assigned to every new asset. Replay of the feedback
/// history always starts from this value.
pub const TRUST_BASELINE: f32 = 0.5;

/// Trust delta for an explicit accept.
pub const TRUST_RATE_ACCEPT: f32 = 0.1;

/// Trust delta for an explicit reject.
pub const TRUST_RATE_REJECT: f32 = -0.1;

/// Trust delta for an implicit ignore (candidate shown, never chosen).
/// A small decay so repeated exposure without selection slowly demotes.
pub const TRUST_RATE_IGNORE: f32 = -0.02;

// =============================================================================
// RANKING
// =============================================================================

/// Scores closer than this are considered ties and broken by trust score,
/// then recency.
pub const SCORE_EPSILON: f32 = 1e-4;

/// Minimum similarity for a candidate to enter a result set.
///
/// Embedding search always produces a score for every asset regardless of
/// actual relevance. 0.3 is conservative — typical good matches score
/// 0.5-0.9, while truly unrelated content scores below 0.2.
pub const SIMILARITY_THRESHOLD: f32 = 0.3;

/// Threshold used by the single automatic widening pass when no candidate
/// clears [`SIMILARITY_THRESHOLD`]. Results served under this threshold are
/// marked degraded.
pub const WIDENED_SIMILARITY_THRESHOLD: f32 = 0.15;

/// Minimum normalized tag overlap for FILTER_THEN_RANK survivors.
pub const MIN_TAG_OVERLAP: f32 = 0.25;

/// Default number of candidates returned by a recall.
pub const RECALL_LIMIT: usize = 10;

/// Relative weights for the per-space vector scores (transcript,
/// description, visual). Aggregation is weighted maximum across spaces.
pub const SPACE_WEIGHT_TRANSCRIPT: f32 = 0.8;
pub const SPACE_WEIGHT_DESCRIPTION: f32 = 1.0;
pub const SPACE_WEIGHT_VISUAL: f32 = 0.9;

// =============================================================================
// CANDIDATE CACHE
// =============================================================================

/// Default TTL for cached candidate sets in seconds.
pub const CACHE_TTL_SECS: u64 = 300;

// =============================================================================
// INGESTION PIPELINE
// =============================================================================

/// Default maximum number of concurrently running ingestion chains.
pub const PIPELINE_MAX_CONCURRENT: usize = 4;

/// Default maximum retry count for a failed pipeline stage.
pub const STAGE_MAX_RETRIES: u32 = 3;

/// Timeout for a single stage attempt in seconds.
pub const STAGE_TIMEOUT_SECS: u64 = 120;

/// Base delay for exponential stage retry backoff in milliseconds.
pub const STAGE_BACKOFF_BASE_MS: u64 = 250;

/// Polling interval for the ingest queue when it is empty.
pub const QUEUE_POLL_INTERVAL_MS: u64 = 500;

/// Keyframe sampling interval in seconds for proxy generation.
pub const KEYFRAME_INTERVAL_SECS: f64 = 5.0;

/// Rough per-stage processing estimate in seconds, used for the
/// `estimated_processing_secs` hint returned on upload.
pub const STAGE_ESTIMATE_SECS: u64 = 20;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default Whisper transcription model.
pub const WHISPER_MODEL: &str = "whisper-1";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3400;

/// Default worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Retry-after hint in seconds attached to retryable API errors.
pub const RETRY_AFTER_SECS: u64 = 5;

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

pub const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
pub const ENV_EMBED_MODEL: &str = "EMBED_MODEL";
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";
pub const ENV_TRUST_BASELINE: &str = "TRUST_BASELINE";
pub const ENV_TRUST_RATE_ACCEPT: &str = "TRUST_RATE_ACCEPT";
pub const ENV_TRUST_RATE_REJECT: &str = "TRUST_RATE_REJECT";
pub const ENV_TRUST_RATE_IGNORE: &str = "TRUST_RATE_IGNORE";
pub const ENV_SIMILARITY_THRESHOLD: &str = "RANK_SIMILARITY_THRESHOLD";
pub const ENV_WIDENED_THRESHOLD: &str = "RANK_WIDENED_THRESHOLD";
pub const ENV_MIN_TAG_OVERLAP: &str = "RANK_MIN_TAG_OVERLAP";
pub const ENV_CACHE_TTL_SECS: &str = "CANDIDATE_CACHE_TTL_SECS";
pub const ENV_PIPELINE_MAX_CONCURRENT: &str = "PIPELINE_MAX_CONCURRENT";
pub const ENV_STAGE_MAX_RETRIES: &str = "PIPELINE_STAGE_MAX_RETRIES";
pub const ENV_STAGE_TIMEOUT_SECS: &str = "PIPELINE_STAGE_TIMEOUT_SECS";
pub const ENV_SERVER_PORT: &str = "SHOTLIST_PORT";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_rates_signs() {
        assert!(TRUST_RATE_ACCEPT > 0.0);
        assert!(TRUST_RATE_REJECT < 0.0);
        assert!(TRUST_RATE_IGNORE < 0.0);
        assert!(TRUST_RATE_IGNORE.abs() < TRUST_RATE_REJECT.abs());
    }

    #[test]
    fn test_baseline_in_unit_interval() {
        assert!((0.0..=1.0).contains(&TRUST_BASELINE));
    }

    #[test]
    fn test_widened_threshold_is_wider() {
        assert!(WIDENED_SIMILARITY_THRESHOLD < SIMILARITY_THRESHOLD);
    }
}

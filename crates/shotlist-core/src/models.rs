//! Core data model: assets, metadata, segments, feedback, queries and
//! candidate sets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tags::{MatchedTag, TagVector};

// =============================================================================
// ASSET
// =============================================================================

/// Where an asset came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    #[default]
    Upload,
    External,
    Generated,
    Local,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::External => write!(f, "external"),
            Self::Generated => write!(f, "generated"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Overall processing status of an asset.
///
/// Monotonic: once `Done`, an asset never regresses except through an
/// explicit reprocess, which resets the pipeline state wholesale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Error,
    Cancelled,
}

impl ProcessingStatus {
    /// Whether this status is terminal for the current pipeline run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }

    /// Whether a transition to `next` is allowed without an explicit
    /// reprocess. `Done` is sticky.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        match self {
            Self::Pending => true,
            Self::Processing => next != Self::Pending,
            Self::Done => next == Self::Done,
            Self::Error | Self::Cancelled => next == *self,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// PIPELINE STAGES
// =============================================================================

/// The fixed, ordered pipeline stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Proxy/keyframe generation.
    Proxy,
    /// Transcript generation from audio. Non-critical.
    Transcript,
    /// Tag/embedding generation. Critical: gates recall eligibility.
    Embedding,
}

impl StageKind {
    /// All stages in execution order.
    pub fn ordered() -> [StageKind; 3] {
        [Self::Proxy, Self::Transcript, Self::Embedding]
    }

    /// Whether failure of this stage fails the whole ingestion.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Embedding)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::Transcript => "transcript",
            Self::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Persistent per-stage record: sub-status, retry accounting and the
/// checkpoint the stage resumes from after a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    /// Attempts consumed so far (counts across restarts).
    pub attempts: u32,
    /// Opaque stage-owned resume point. A completed stage keeps its final
    /// checkpoint so idempotent re-runs can skip work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// SEGMENTS & EMBEDDINGS
// =============================================================================

/// A time-bounded, semantically meaningful sub-span of an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The embedding spaces an asset can be indexed under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSpace {
    Transcript,
    Description,
    Visual,
}

impl std::fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transcript => write!(f, "transcript"),
            Self::Description => write!(f, "description"),
            Self::Visual => write!(f, "visual"),
        }
    }
}

// =============================================================================
// FEEDBACK
// =============================================================================

/// Kind of feedback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    ExplicitAccept,
    ExplicitReject,
    ImplicitIgnore,
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExplicitAccept => write!(f, "explicit_accept"),
            Self::ExplicitReject => write!(f, "explicit_reject"),
            Self::ImplicitIgnore => write!(f, "implicit_ignore"),
        }
    }
}

/// One immutable entry in an asset's feedback history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub feedback_type: FeedbackType,
    /// The query context string that produced the exposure.
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FeedbackRecord {
    pub fn new(feedback_type: FeedbackType, context: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            feedback_type,
            context: context.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// =============================================================================
// ASSET METADATA
// =============================================================================

/// Extracted metadata and evolving quality signals for an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub processing_status: ProcessingStatus,
    /// Per-stage state, keyed by stage kind.
    #[serde(default)]
    pub stages: BTreeMap<StageKind, StageState>,
    /// Per-category weighted tag vector ("global tags").
    #[serde(default)]
    pub global_tags: TagVector,
    /// Time-ordered segments produced during ingestion.
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// Embedding per space. Presence of at least one space plus a `Done`
    /// status makes the asset recall-eligible.
    #[serde(default)]
    pub embeddings: BTreeMap<EmbeddingSpace, Vec<f32>>,
    /// Feedback-derived quality signal, always clamped to [0, 1].
    pub trust_score: f32,
    /// Append-only feedback history. The trust score is reproducible by
    /// replaying this history from the fixed baseline.
    #[serde(default)]
    pub feedback_history: Vec<FeedbackRecord>,
}

impl Default for AssetMetadata {
    fn default() -> Self {
        Self {
            processing_status: ProcessingStatus::Pending,
            stages: StageKind::ordered()
                .into_iter()
                .map(|k| (k, StageState::default()))
                .collect(),
            global_tags: TagVector::new(),
            segments: Vec::new(),
            embeddings: BTreeMap::new(),
            trust_score: crate::defaults::TRUST_BASELINE,
            feedback_history: Vec::new(),
        }
    }
}

impl AssetMetadata {
    /// Reset pipeline state for an explicit reprocess. Tags, segments and
    /// embeddings survive until their stages overwrite them; trust and
    /// feedback history are untouched.
    pub fn reset_for_reprocess(&mut self) {
        self.processing_status = ProcessingStatus::Pending;
        for state in self.stages.values_mut() {
            *state = StageState::default();
        }
    }

    /// State for a stage, defaulting to pending if never recorded.
    pub fn stage(&self, kind: StageKind) -> StageState {
        self.stages.get(&kind).cloned().unwrap_or_default()
    }
}

/// A stored media item with extracted metadata and an evolving trust score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Locator of the source media.
    pub media_path: String,
    /// Locator of the generated proxy thumbnail, once the proxy stage ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    pub mime_type: String,
    pub provenance: Provenance,
    pub metadata: AssetMetadata,
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag. Assets referenced by scene selections are never
    /// hard-deleted.
    #[serde(default)]
    pub deleted: bool,
}

impl Asset {
    /// Create a new asset in its pre-ingestion state.
    pub fn new(project_id: Uuid, media_path: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            media_path: media_path.into(),
            thumbnail_path: None,
            mime_type: mime_type.into(),
            provenance: Provenance::Upload,
            metadata: AssetMetadata::default(),
            created_at: Utc::now(),
            deleted: false,
        }
    }

    /// Whether the asset may appear in recall results: processing is done
    /// for at least the critical embedding modality and the asset is live.
    pub fn is_recall_eligible(&self) -> bool {
        !self.deleted
            && self.metadata.processing_status == ProcessingStatus::Done
            && !self.metadata.embeddings.is_empty()
    }
}

// =============================================================================
// QUERY & CANDIDATES
// =============================================================================

/// A semantic description of a desired shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallQuery {
    /// Scene/beat identifier; also the candidate-cache key.
    pub query_key: String,
    /// Categorical tags describing the shot.
    #[serde(default)]
    pub tags: TagVector,
    /// Free-text notes.
    #[serde(default)]
    pub notes: String,
    /// Trades exact tag matching (0) against loose semantic similarity (1).
    /// Clamped to [0, 1] before use.
    pub fuzziness: f32,
    /// Maximum number of candidates to return.
    pub limit: usize,
}

impl RecallQuery {
    pub fn new(query_key: impl Into<String>) -> Self {
        Self {
            query_key: query_key.into(),
            tags: TagVector::new(),
            notes: String::new(),
            fuzziness: 0.5,
            limit: crate::defaults::RECALL_LIMIT,
        }
    }

    pub fn with_tags(mut self, tags: TagVector) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_fuzziness(mut self, fuzziness: f32) -> Self {
        self.fuzziness = fuzziness;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Fuzziness clamped to [0, 1]; NaN collapses to 0.
    pub fn clamped_fuzziness(&self) -> f32 {
        if self.fuzziness.is_nan() {
            0.0
        } else {
            self.fuzziness.clamp(0.0, 1.0)
        }
    }

    /// Reject structurally invalid queries.
    pub fn validate(&self) -> crate::Result<()> {
        if self.query_key.trim().is_empty() {
            return Err(crate::Error::Validation("query_key must not be empty".into()));
        }
        if self.limit == 0 {
            return Err(crate::Error::Validation("limit must be at least 1".into()));
        }
        if self.tags.is_empty() && self.notes.trim().is_empty() {
            return Err(crate::Error::Validation(
                "query must carry tags or free-text notes".into(),
            ));
        }
        Ok(())
    }

    /// The query context string recorded alongside feedback events.
    pub fn context_string(&self) -> String {
        if self.notes.trim().is_empty() {
            format!("{} [{}]", self.query_key, self.tags.to_prompt())
        } else {
            format!("{} [{}] {}", self.query_key, self.tags.to_prompt(), self.notes.trim())
        }
    }
}

/// One ranked candidate in a recall result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub asset_id: Uuid,
    pub score: f32,
    /// 1-based rank, unique and contiguous within a result set.
    pub rank: usize,
    #[serde(default)]
    pub matched_tags: Vec<MatchedTag>,
    /// Human-readable explanation of the top contributing signals.
    pub match_reason: String,
}

/// The cached, ordered result of one recall operation for one query key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub query_key: String,
    pub candidates: Vec<Candidate>,
    /// 1-based pointer at the currently selected candidate; 0 when empty.
    pub active_rank: usize,
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the query that produced this set. A changed query
    /// invalidates the cache entry.
    pub fingerprint: String,
    pub has_match: bool,
    /// True when the set was produced by the automatic threshold-widening
    /// pass.
    #[serde(default)]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder_message: Option<String>,
    /// Number of assets considered by the recall.
    pub total_searched: usize,
}

impl CandidateSet {
    /// An empty "no match" set with a suggestion for the user.
    pub fn empty(
        query_key: impl Into<String>,
        fingerprint: impl Into<String>,
        total_searched: usize,
        placeholder_message: impl Into<String>,
    ) -> Self {
        Self {
            query_key: query_key.into(),
            candidates: Vec::new(),
            active_rank: 0,
            created_at: Utc::now(),
            fingerprint: fingerprint.into(),
            has_match: false,
            degraded: false,
            placeholder_message: Some(placeholder_message.into()),
            total_searched,
        }
    }

    /// The candidate at the active rank, if any.
    pub fn active_candidate(&self) -> Option<&Candidate> {
        if self.active_rank == 0 {
            return None;
        }
        self.candidates.iter().find(|c| c.rank == self.active_rank)
    }

    /// The candidate at a given rank.
    pub fn candidate_at(&self, rank: usize) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.rank == rank)
    }

    /// Verify that ranks form the contiguous permutation 1..=N and scores
    /// never increase as rank increases.
    pub fn is_well_formed(&self) -> bool {
        for (i, c) in self.candidates.iter().enumerate() {
            if c.rank != i + 1 {
                return false;
            }
            if i > 0 && c.score > self.candidates[i - 1].score + crate::defaults::SCORE_EPSILON {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// TASK HANDLE
// =============================================================================

/// State machine for a background ingestion task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Pull-based, monotonically advancing progress record for one ingestion
/// chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestTask {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub status: TaskStatus,
    /// Progress percent, monotonically non-decreasing while the task runs.
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestTask {
    pub fn new(asset_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asset_id,
            status: TaskStatus::Pending,
            progress_percent: 0,
            progress_message: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

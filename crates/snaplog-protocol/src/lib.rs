//! Shared data types for Snaplog requests, timelines, observations and the
//! generation service contract.

mod generation;
mod observation;
mod photo;

pub use generation::{
    GenerationAttempt, GenerationError, GenerationPurpose, GenerationReply, GenerationRequest,
    GenerationService, ImagePayload, ResponseFormat,
};
pub use observation::{
    FoodObservation, Flow, IndoorOutdoor, Movement, NameCandidate, ObservationFrame,
    ObservationGlobal, TimeOfDay,
};
pub use photo::{
    CompanionRecord, DayBreak, OrderingTrace, PhotoData, PhotoInput, ResolvedTimestamp,
    SequencedPhoto, TimestampSource, TimestampValue,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a diary run.
pub type RequestId = Uuid;

/// Caller-facing request: one batch of photos plus optional companion data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiaryRequest {
    /// Photos in arrival order.
    #[serde(default)]
    pub photos: Vec<PhotoInput>,
    /// Companion summary records aligned with `photos` by index.
    #[serde(default)]
    pub summaries: Vec<CompanionRecord>,
    /// Free-form tone hint (e.g. "calm", "cheerful").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    /// Calendar date the first photo should be moved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
}

impl DiaryRequest {
    pub fn new(photos: Vec<PhotoInput>) -> Self {
        Self {
            photos,
            ..Self::default()
        }
    }

    pub fn with_summaries(mut self, summaries: Vec<CompanionRecord>) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_target_date(mut self, target_date: NaiveDate) -> Self {
        self.target_date = Some(target_date);
        self
    }
}

/// Narrative category chosen from batch size and observed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiaryCategory {
    FoodSingle,
    GeneralSingle,
    JourneyMulti,
}

impl DiaryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiaryCategory::FoodSingle => "food_single",
            DiaryCategory::GeneralSingle => "general_single",
            DiaryCategory::JourneyMulti => "journey_multi",
        }
    }
}

impl fmt::Display for DiaryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target length of the narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthBucket {
    Short,
    Long,
}

impl LengthBucket {
    /// Single photos get the short bucket.
    pub fn for_count(count: usize) -> Self {
        if count <= 1 {
            LengthBucket::Short
        } else {
            LengthBucket::Long
        }
    }

    /// Sentence-count instruction used in prompts.
    pub fn sentence_rule(&self) -> &'static str {
        match self {
            LengthBucket::Short => "3-4 sentences",
            LengthBucket::Long => "5-7 sentences",
        }
    }
}

/// Which route produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPath {
    /// Observation frames, composed and stitched.
    VisionPipeline,
    /// Observation frames, rendered by the deterministic template.
    FrameTemplate,
    /// Text-only generation from companion summary lines.
    SummaryLines,
    /// Fixed fallback sentence.
    Fallback,
}

/// Pipeline states, in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Resolving,
    Sequencing,
    Extracting,
    Composing,
    CrossValidating,
    Stitching,
    Refining,
    Done,
    Rejected,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStage::Done | PipelineStage::Rejected | PipelineStage::Failed
        )
    }
}

/// How the cross-validation step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossValidationDecision {
    /// Disabled by configuration.
    SkippedDisabled,
    /// No distinct alternate model configured.
    SkippedNoAlternate,
    /// Heuristic score below the configured minimum.
    SkippedLowScore,
    /// Both drafts agree after whitespace normalisation.
    KeptPrimary,
    /// Drafts differ; the alternate was selected.
    SelectedAlternate,
    /// Alternate call failed; primary kept.
    AlternateFailed,
}

/// Decision record emitted by the cross-validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationRecord {
    pub decision: CrossValidationDecision,
    pub primary_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_model: Option<String>,
    /// Heuristic score in `[0, 1]`.
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_error: Option<String>,
}

/// Completed diary run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryResponse {
    pub request_id: RequestId,
    /// Final, tag-free paragraph.
    pub body: String,
    pub category: DiaryCategory,
    pub length: LengthBucket,
    pub path: GenerationPath,
    #[serde(default)]
    pub observations: Vec<ObservationFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<ObservationGlobal>,
    /// Resolved `YYYY-MM-DD` per sequence position (empty when undated).
    #[serde(default)]
    pub date_sequence: Vec<String>,
    #[serde(default)]
    pub day_breaks: Vec<DayBreak>,
    #[serde(default)]
    pub ordering: Vec<OrderingTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<CrossValidationRecord>,
    pub refined: bool,
    /// States visited, ending in a terminal state.
    #[serde(default)]
    pub stages: Vec<PipelineStage>,
}

/// Why a run was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The generation service refused the content.
    UnsafeContent,
}

/// Result of a diary run that did not error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DiaryOutcome {
    Completed(DiaryResponse),
    Rejected {
        request_id: RequestId,
        reason: RejectReason,
        /// Safe message to show the user.
        message: String,
    },
}

impl DiaryOutcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            DiaryOutcome::Completed(response) => response.request_id,
            DiaryOutcome::Rejected { request_id, .. } => *request_id,
        }
    }

    /// Final text shown to the user.
    pub fn body(&self) -> &str {
        match self {
            DiaryOutcome::Completed(response) => &response.body,
            DiaryOutcome::Rejected { message, .. } => message,
        }
    }
}

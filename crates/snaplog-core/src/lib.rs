//! Core pipeline for Snaplog.
//!
//! This crate owns timestamp resolution and sequencing, the shared throttle in
//! front of the generation service, the OpenAI-compatible provider, and the
//! staged diary pipeline.

pub mod error;
pub mod generation;
pub mod media;
pub mod pipeline;
pub mod throttle;
pub mod timeline;
pub mod types;

pub use error::SnaplogCoreError;
pub use generation::{OpenAiCompatibleProvider, ThrottledGenerator};
/// Pipeline facade and its stages.
pub use pipeline::{
    Categorizer, DiaryPipeline, REJECTED_MESSAGE, Stitcher, TextCleaner, fallback_sentence,
};
/// Shared rate limiter.
pub use throttle::{ThrottleError, ThrottleSettings, ThrottledInvoker};
pub use timeline::{Timeline, TimestampResolver, detect_day_breaks, transition_label};
pub use types::{StageFailure, StageOutcome};

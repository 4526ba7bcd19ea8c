//! Contract with the external generation service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which pipeline stage issued a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPurpose {
    /// Vision call producing structured observation frames.
    Observation,
    /// Draft narrative composition.
    Draft,
    /// Stylistic rewrite of the selected draft.
    Refine,
    /// Text-only diary from companion summary lines.
    SummaryLines,
}

impl GenerationPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationPurpose::Observation => "observation",
            GenerationPurpose::Draft => "draft",
            GenerationPurpose::Refine => "refine",
            GenerationPurpose::SummaryLines => "summary_lines",
        }
    }
}

/// Expected shape of the reply content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

/// Image attached to a request, as a `data:` or remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub url: String,
}

/// One call to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub purpose: GenerationPurpose,
    pub model: String,
    pub system: String,
    pub prompt: String,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    pub max_tokens: u32,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

/// Content returned by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReply {
    /// Model that produced the reply.
    pub model: String,
    pub content: String,
}

/// Debug record of a single generation round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub purpose: GenerationPurpose,
    pub model: String,
    pub prompt_chars: usize,
    pub image_count: usize,
    pub output: String,
}

impl GenerationAttempt {
    pub fn new(request: &GenerationRequest, output: impl Into<String>) -> Self {
        Self {
            purpose: request.purpose,
            model: request.model.clone(),
            prompt_chars: request.system.chars().count() + request.prompt.chars().count(),
            image_count: request.images.len(),
            output: output.into(),
        }
    }
}

/// Errors reported by a generation service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    /// The service asked the caller to slow down.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Machine-readable retry hint, when the service sent one.
        retry_after: Option<Duration>,
    },
    /// The call did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),
    /// The service could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The service refused the content.
    #[error("content policy refusal: {0}")]
    ContentPolicy(String),
    /// The reply could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Any other provider failure.
    #[error("provider error: {0}")]
    Provider(String),
}

impl GenerationError {
    /// Rate limits, timeouts and connection failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited { .. }
                | GenerationError::Timeout(_)
                | GenerationError::Connection(_)
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }

    /// Explicit retry hint carried by the error, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// External generation (text and vision) service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "generation"
    }

    /// Perform one round trip.
    async fn generate(&self, request: GenerationRequest)
    -> Result<GenerationReply, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_transient_errors_are_retryable() {
        let rate = GenerationError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_millis(250)),
        };
        assert!(rate.is_retryable());
        assert_eq!(rate.retry_after(), Some(Duration::from_millis(250)));
        assert!(GenerationError::Timeout("t".to_string()).is_retryable());
        assert!(GenerationError::Connection("c".to_string()).is_retryable());
        assert!(!GenerationError::ContentPolicy("p".to_string()).is_retryable());
        assert!(!GenerationError::InvalidResponse("i".to_string()).is_retryable());
        assert!(!GenerationError::Provider("x".to_string()).is_retryable());
    }
}

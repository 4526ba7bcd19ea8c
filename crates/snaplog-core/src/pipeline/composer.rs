//! Tagged draft composition from observation frames.

use super::cleanup::TextCleaner;
use super::prompt::{DRAFT_SYSTEM, DraftContext, draft_prompt};
use crate::generation::ThrottledGenerator;
use crate::types::StageFailure;
use log::{info, warn};
use snaplog_config::GenerationConfig;
use snaplog_protocol::{GenerationAttempt, GenerationPurpose, GenerationRequest, ResponseFormat};

/// Drafts are shorter than observation and refine replies.
const DRAFT_MAX_TOKENS: u32 = 600;

/// A tagged draft from one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub model: String,
    /// Raw draft with `<fN>` tags, brand names generalised.
    pub text: String,
    pub attempt: GenerationAttempt,
}

#[derive(Debug, Clone)]
pub struct NarrativeComposer {
    temperature: f32,
    top_p: Option<f32>,
    max_tokens: u32,
}

impl NarrativeComposer {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperatures.draft,
            top_p: config.draft_top_p,
            max_tokens: config.max_tokens.min(DRAFT_MAX_TOKENS),
        }
    }

    /// Request one tagged draft from `model`.
    pub async fn draft(
        &self,
        generator: &ThrottledGenerator,
        ctx: &DraftContext<'_>,
        model: &str,
        cleaner: &TextCleaner,
    ) -> Result<Draft, StageFailure> {
        let request = GenerationRequest {
            purpose: GenerationPurpose::Draft,
            model: model.to_string(),
            system: DRAFT_SYSTEM.to_string(),
            prompt: draft_prompt(ctx),
            images: Vec::new(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat::Text,
        };
        let (reply, attempt) = generator.generate(request).await.map_err(|err| {
            warn!("draft call failed (model={model}, err={err})");
            StageFailure::Service(err)
        })?;
        let text = reply.content.trim();
        if text.is_empty() {
            return Err(StageFailure::Unparseable("empty draft".to_string()));
        }
        info!(
            "draft composed (model={}, chars={})",
            reply.model,
            text.chars().count()
        );
        Ok(Draft {
            model: model.to_string(),
            text: cleaner.generalize_brands(text, ctx.frames),
            attempt,
        })
    }
}

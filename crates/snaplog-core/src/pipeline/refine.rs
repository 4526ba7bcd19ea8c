//! Final rewrite pass over the selected tagged draft.

use super::prompt::{REFINE_SYSTEM, refine_prompt};
use crate::generation::ThrottledGenerator;
use crate::types::StageFailure;
use log::{debug, info, warn};
use snaplog_config::SnaplogConfig;
use snaplog_protocol::{GenerationPurpose, GenerationRequest, LengthBucket, ResponseFormat};

#[derive(Debug, Clone)]
pub struct Refiner {
    enabled: bool,
    min_chars: usize,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl Refiner {
    pub fn from_config(config: &SnaplogConfig) -> Self {
        Self {
            enabled: config.pipeline.refine.enabled,
            min_chars: config.pipeline.refine.min_chars,
            model: config.generation.text_model.clone(),
            temperature: config.generation.temperatures.refine,
            max_tokens: config.generation.max_tokens,
        }
    }

    /// Refinement runs only when enabled and the stitched draft is long
    /// enough to be worth rewriting.
    pub fn should_refine(&self, stitched: &str) -> bool {
        if !self.enabled {
            debug!("refine skipped (reason=disabled)");
            return false;
        }
        let chars = stitched.chars().count();
        if chars < self.min_chars {
            debug!(
                "refine skipped (reason=short, chars={chars}, min_chars={})",
                self.min_chars
            );
            return false;
        }
        true
    }

    /// Rewrite `tagged`; the reply is expected to keep the `<fN>` tags.
    pub async fn refine(
        &self,
        generator: &ThrottledGenerator,
        tagged: &str,
        tone: &str,
        length: LengthBucket,
    ) -> Result<String, StageFailure> {
        let request = GenerationRequest {
            purpose: GenerationPurpose::Refine,
            model: self.model.clone(),
            system: REFINE_SYSTEM.to_string(),
            prompt: refine_prompt(tagged, tone, length),
            images: Vec::new(),
            temperature: self.temperature,
            top_p: None,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat::Text,
        };
        let (reply, _) = generator.generate(request).await.map_err(|err| {
            warn!("refine call failed (model={}, err={err})", self.model);
            StageFailure::Service(err)
        })?;
        let text = reply.content.trim();
        if text.is_empty() {
            return Err(StageFailure::Unparseable("empty refinement".to_string()));
        }
        info!(
            "draft refined (model={}, chars={})",
            reply.model,
            text.chars().count()
        );
        Ok(text.to_string())
    }
}

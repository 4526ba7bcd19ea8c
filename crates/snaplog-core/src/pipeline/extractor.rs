//! Structured observation extraction: one vision call per batch.

use super::cleanup::TextCleaner;
use super::prompt::{OBSERVATION_SYSTEM, observation_prompt};
use crate::generation::ThrottledGenerator;
use crate::types::{StageFailure, StageOutcome};
use log::{debug, info, warn};
use serde_json::Value;
use snaplog_config::GenerationConfig;
use snaplog_protocol::{
    FoodObservation, GenerationError, GenerationPurpose, GenerationRequest, ImagePayload,
    ObservationFrame, ObservationGlobal, ResponseFormat,
};

/// Frames aligned with the sequence, plus batch-level hints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observations {
    pub frames: Vec<ObservationFrame>,
    pub global: ObservationGlobal,
}

#[derive(Debug, Clone)]
pub struct ObservationExtractor {
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ObservationExtractor {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            model: config.vision_model.clone(),
            temperature: config.temperatures.observation,
            max_tokens: config.max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask for one frame per image; `images` must already be in sequence
    /// order. The food block is requested for single photos only.
    pub async fn extract(
        &self,
        generator: &ThrottledGenerator,
        images: Vec<ImagePayload>,
        cleaner: &TextCleaner,
    ) -> StageOutcome<Observations> {
        let count = images.len();
        let include_food = count == 1;
        let request = GenerationRequest {
            purpose: GenerationPurpose::Observation,
            model: self.model.clone(),
            system: OBSERVATION_SYSTEM.to_string(),
            prompt: observation_prompt(count, include_food),
            images,
            temperature: self.temperature,
            top_p: None,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat::JsonObject,
        };
        let reply = match generator.generate(request).await {
            Ok((reply, _)) => reply,
            Err(err) => {
                if let GenerationError::ContentPolicy(message) = err.generation_error() {
                    warn!("observation refused by content policy (model={})", self.model);
                    return StageOutcome::Rejected(message.clone());
                }
                warn!("observation call failed (model={}, err={err})", self.model);
                return StageOutcome::Failed(StageFailure::Service(err));
            }
        };
        match parse_observations(&reply.content, count, include_food, cleaner) {
            Ok(observations) => {
                info!(
                    "observations extracted (model={}, frames={})",
                    reply.model,
                    observations.frames.len()
                );
                StageOutcome::Ok(observations)
            }
            Err(reason) => {
                warn!("observation reply unusable (model={}, reason={reason})", reply.model);
                StageOutcome::Failed(StageFailure::Unparseable(reason))
            }
        }
    }
}

/// Parse the model's JSON into exactly `count` frames indexed `1..=count`.
pub fn parse_observations(
    content: &str,
    count: usize,
    include_food: bool,
    cleaner: &TextCleaner,
) -> Result<Observations, String> {
    let value: Value = serde_json::from_str(strip_fences(content))
        .map_err(|err| format!("invalid json: {err}"))?;
    let Value::Object(root) = value else {
        return Err("reply is not a json object".to_string());
    };
    let Some(Value::Array(raw_frames)) = root.get("frames") else {
        return Err("reply has no frames array".to_string());
    };
    if raw_frames.len() != count {
        debug!(
            "frame count mismatch, aligning (expected={count}, received={})",
            raw_frames.len()
        );
    }

    let mut frames: Vec<ObservationFrame> = raw_frames
        .iter()
        .take(count)
        .map(|raw| {
            serde_json::from_value::<ObservationFrame>(raw.clone()).unwrap_or_else(|err| {
                debug!("frame dropped to empty (err={err})");
                ObservationFrame::default()
            })
        })
        .collect();
    frames.resize_with(count, ObservationFrame::default);
    for (idx, frame) in frames.iter_mut().enumerate() {
        normalize_frame(frame, idx + 1, include_food, cleaner);
    }

    let global = root
        .get("global")
        .cloned()
        .and_then(|raw| serde_json::from_value(raw).ok())
        .unwrap_or_default();
    Ok(Observations { frames, global })
}

fn normalize_frame(
    frame: &mut ObservationFrame,
    index: usize,
    include_food: bool,
    cleaner: &TextCleaner,
) {
    frame.index = index;
    frame.summary = cleaner.clean(&frame.summary);
    frame.elements = frame
        .elements
        .iter()
        .map(|element| cleaner.clean(element))
        .filter(|element| !element.is_empty())
        .collect();
    frame.place_hint = non_blank(frame.place_hint.take());
    frame.space_relations = non_blank(frame.space_relations.take()).map(|text| cleaner.clean(&text));
    frame.visible_text = non_blank(frame.visible_text.take());
    frame.food = if include_food {
        frame.food.take().map(normalize_food)
    } else {
        None
    };
}

fn normalize_food(mut food: FoodObservation) -> FoodObservation {
    food.serving_style = non_blank(food.serving_style.take());
    food.visible_ingredients.retain(|item| !item.trim().is_empty());
    food.name_candidates.retain(|candidate| !candidate.name.trim().is_empty());
    for candidate in &mut food.name_candidates {
        candidate.confidence = if candidate.confidence.is_finite() {
            candidate.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
    food.name_candidates
        .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    food
}

/// Treat blank strings and "unknown"/"none" placeholders as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("unknown")
        || trimmed.eq_ignore_ascii_case("none")
    {
        return None;
    }
    Some(trimmed.to_string())
}

fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

//! Text-only diary from companion summary lines, the category rules, and the
//! fixed fallback sentences.

use super::cleanup::TextCleaner;
use super::prompt::{SUMMARY_LINES_SYSTEM, summary_lines_prompt};
use crate::generation::ThrottledGenerator;
use crate::types::StageFailure;
use log::{info, warn};
use rand::seq::IndexedRandom;
use regex::Regex;
use snaplog_config::GenerationConfig;
use snaplog_protocol::{
    CompanionRecord, DiaryCategory, GenerationPurpose, GenerationRequest, LengthBucket,
    ObservationFrame, ResponseFormat,
};

/// Companion fields joined into one clue line, in order.
pub const LINE_FIELDS: &[&str] = &["place", "time", "weather", "desc"];

const FOOD_PATTERN: &str = r"(?i)\b(?:food|restaurant|cafe|café|coffee|cake|bread|bakery|meal|lunch|dinner|brunch|dessert|noodles?|ramen|pasta|pizza|drinks?)\b";

const SUMMARY_MAX_TOKENS: u32 = 600;

/// Returned when no usable text could be generated.
pub const FALLBACK_SENTENCES: &[&str] = &[
    "Nothing much happened today, but a few small moments stayed with me.",
    "I only moved around a little, yet the air felt slightly different.",
    "Nothing out of the ordinary, but one small detail lingered for a while.",
];

pub fn fallback_sentence() -> &'static str {
    FALLBACK_SENTENCES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FALLBACK_SENTENCES[0])
}

/// Build cleaned clue lines from companion records, skipping empty ones.
pub fn collect_lines(records: &[CompanionRecord], cleaner: &TextCleaner) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let joined = LINE_FIELDS
                .iter()
                .filter_map(|field| record.text(field))
                .collect::<Vec<_>>()
                .join(" ");
            cleaner.clean(&joined)
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// Chooses the narrative category.
#[derive(Debug, Clone)]
pub struct Categorizer {
    food: Regex,
}

impl Categorizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            food: Regex::new(FOOD_PATTERN)?,
        })
    }

    pub fn for_lines(&self, lines: &[String]) -> DiaryCategory {
        match lines {
            [line] if self.food.is_match(line) => DiaryCategory::FoodSingle,
            [_] => DiaryCategory::GeneralSingle,
            _ => DiaryCategory::JourneyMulti,
        }
    }

    /// A single frame is food when the food block says so or its text
    /// mentions food.
    pub fn for_frames(&self, frames: &[ObservationFrame]) -> DiaryCategory {
        let [frame] = frames else {
            return if frames.is_empty() {
                DiaryCategory::GeneralSingle
            } else {
                DiaryCategory::JourneyMulti
            };
        };
        let food_block = frame
            .food
            .as_ref()
            .is_some_and(|food| food.has_food || food.has_drink);
        let food_text = self.food.is_match(&frame.summary)
            || frame.elements.iter().any(|element| self.food.is_match(element));
        if food_block || food_text {
            DiaryCategory::FoodSingle
        } else {
            DiaryCategory::GeneralSingle
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryWriter {
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl SummaryWriter {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            model: config.text_model.clone(),
            temperature: config.temperatures.summary_lines,
            max_tokens: config.max_tokens.min(SUMMARY_MAX_TOKENS),
        }
    }

    pub async fn write(
        &self,
        generator: &ThrottledGenerator,
        lines: &[String],
        tone: &str,
        cleaner: &TextCleaner,
    ) -> Result<String, StageFailure> {
        let length = LengthBucket::for_count(lines.len());
        let request = GenerationRequest {
            purpose: GenerationPurpose::SummaryLines,
            model: self.model.clone(),
            system: SUMMARY_LINES_SYSTEM.to_string(),
            prompt: summary_lines_prompt(lines, tone, length),
            images: Vec::new(),
            temperature: self.temperature,
            top_p: None,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat::Text,
        };
        let (reply, _) = generator.generate(request).await.map_err(|err| {
            warn!("summary-lines call failed (model={}, err={err})", self.model);
            StageFailure::Service(err)
        })?;
        let text = cleaner.soften(&reply.content);
        if text.is_empty() {
            return Err(StageFailure::Unparseable("empty summary-lines reply".to_string()));
        }
        info!(
            "diary written from summary lines (model={}, lines={})",
            reply.model,
            lines.len()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use snaplog_protocol::FoodObservation;

    fn record(value: serde_json::Value) -> CompanionRecord {
        serde_json::from_value(value).expect("record")
    }

    #[test]
    fn lines_join_fields_in_order() {
        let cleaner = TextCleaner::new().expect("cleaner");
        let lines = collect_lines(
            &[
                record(json!({ "desc": "long walk", "place": "riverside", "weather": "windy" })),
                record(json!({ "place": "  ", "desc": "" })),
                record(json!({ "time": "evening", "desc": "dinner with noodles" })),
            ],
            &cleaner,
        );
        assert_eq!(
            lines,
            vec![
                "riverside windy long walk".to_string(),
                "evening dinner with noodles".to_string()
            ]
        );
    }

    #[test]
    fn categories_follow_count_and_food_words() {
        let categorizer = Categorizer::new().expect("categorizer");
        assert_eq!(
            categorizer.for_lines(&["Lunch at a small place".to_string()]),
            DiaryCategory::FoodSingle
        );
        assert_eq!(
            categorizer.for_lines(&["quiet park".to_string()]),
            DiaryCategory::GeneralSingle
        );
        assert_eq!(
            categorizer.for_lines(&["a".to_string(), "b".to_string()]),
            DiaryCategory::JourneyMulti
        );

        let mut frame = ObservationFrame::empty(1);
        assert_eq!(categorizer.for_frames(&[frame.clone()]), DiaryCategory::GeneralSingle);
        frame.food = Some(FoodObservation {
            has_drink: true,
            ..FoodObservation::default()
        });
        assert_eq!(categorizer.for_frames(&[frame.clone()]), DiaryCategory::FoodSingle);
        assert_eq!(
            categorizer.for_frames(&[frame.clone(), frame]),
            DiaryCategory::JourneyMulti
        );
    }

    #[test]
    fn fallback_sentence_is_from_the_fixed_set() {
        assert!(FALLBACK_SENTENCES.contains(&fallback_sentence()));
    }
}

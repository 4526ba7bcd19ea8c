//! Divergence check between a primary and an alternate draft.

use super::composer::Draft;
use crate::types::StageFailure;
use log::{debug, info, warn};
use snaplog_config::SnaplogConfig;
use snaplog_protocol::{
    CrossValidationDecision, CrossValidationRecord, Flow, IndoorOutdoor, ObservationFrame,
    TimeOfDay,
};

/// What the validator intends to do for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CrossValidationPlan {
    /// Do not call the alternate model.
    Skip(CrossValidationRecord),
    /// Call `alternate_model` and compare.
    Run { alternate_model: String, score: f32 },
}

#[derive(Debug, Clone)]
pub struct CrossValidator {
    enabled: bool,
    min_score: f32,
    keywords: Vec<String>,
    primary_model: String,
    alternate_model: Option<String>,
}

impl CrossValidator {
    pub fn from_config(config: &SnaplogConfig) -> Self {
        let cross = &config.pipeline.cross_validation;
        Self {
            enabled: cross.enabled,
            min_score: cross.min_score,
            keywords: cross
                .keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
            primary_model: config.generation.text_model.clone(),
            alternate_model: config.generation.distinct_alt_model().map(str::to_string),
        }
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    /// Decide whether the alternate draft is worth requesting.
    pub fn plan(&self, frames: &[ObservationFrame]) -> CrossValidationPlan {
        let score = heuristic_score(frames, &self.keywords);
        let skip = |decision: CrossValidationDecision| {
            debug!("cross-validation skipped (decision={decision:?}, score={score:.2})");
            CrossValidationPlan::Skip(CrossValidationRecord {
                decision,
                primary_model: self.primary_model.clone(),
                alternate_model: self.alternate_model.clone(),
                score,
                alternate_error: None,
            })
        };
        if !self.enabled {
            return skip(CrossValidationDecision::SkippedDisabled);
        }
        let Some(alternate_model) = self.alternate_model.clone() else {
            return skip(CrossValidationDecision::SkippedNoAlternate);
        };
        if score < self.min_score {
            return skip(CrossValidationDecision::SkippedLowScore);
        }
        CrossValidationPlan::Run {
            alternate_model,
            score,
        }
    }

    /// Pick between the two drafts. Identical drafts keep the primary;
    /// divergent drafts take the alternate; a failed alternate keeps the primary.
    pub fn select(
        &self,
        primary: Draft,
        alternate: Result<Draft, StageFailure>,
        alternate_model: &str,
        score: f32,
    ) -> (Draft, CrossValidationRecord) {
        let record = |decision: CrossValidationDecision, alternate_error: Option<String>| {
            CrossValidationRecord {
                decision,
                primary_model: primary.model.clone(),
                alternate_model: Some(alternate_model.to_string()),
                score,
                alternate_error,
            }
        };
        match alternate {
            Ok(alternate) if normalize(&alternate.text) == normalize(&primary.text) => {
                let record = record(CrossValidationDecision::KeptPrimary, None);
                info!("cross-validation kept primary (model={})", primary.model);
                (primary, record)
            }
            Ok(alternate) => {
                let record = record(CrossValidationDecision::SelectedAlternate, None);
                info!(
                    "cross-validation selected alternate (primary={}, alternate={})",
                    primary.model, alternate.model
                );
                (alternate, record)
            }
            Err(failure) => {
                let message = match &failure {
                    StageFailure::Service(err) => err.to_string(),
                    StageFailure::Unparseable(reason) => reason.clone(),
                };
                warn!("alternate draft failed (model={alternate_model}, err={message})");
                let record = record(CrossValidationDecision::AlternateFailed, Some(message));
                (primary, record)
            }
        }
    }
}

/// Score in `[0, 1]`: half structural richness of the frames, half the share
/// of frames that mention a configured keyword.
pub fn heuristic_score(frames: &[ObservationFrame], keywords: &[String]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let count = frames.len() as f32;
    let richness = frames.iter().map(richness).sum::<f32>() / count;
    let hit_rate = if keywords.is_empty() {
        0.0
    } else {
        frames
            .iter()
            .filter(|frame| mentions_keyword(frame, keywords))
            .count() as f32
            / count
    };
    0.5 * richness + 0.5 * hit_rate
}

fn richness(frame: &ObservationFrame) -> f32 {
    let filled = [
        !frame.summary.is_empty(),
        !frame.elements.is_empty(),
        frame.indoor_outdoor != IndoorOutdoor::Unknown,
        frame.time_hint != TimeOfDay::Unknown,
        frame.place_hint.is_some(),
        frame.space_relations.is_some(),
        frame.has_visible_text(),
        frame.flow != Flow::Unknown,
    ];
    filled.iter().filter(|set| **set).count() as f32 / filled.len() as f32
}

fn mentions_keyword(frame: &ObservationFrame, keywords: &[String]) -> bool {
    let mut haystack = frame.summary.to_lowercase();
    for extra in frame
        .elements
        .iter()
        .chain(frame.place_hint.iter())
        .chain(frame.visible_text.iter())
    {
        haystack.push(' ');
        haystack.push_str(&extra.to_lowercase());
    }
    keywords.iter().any(|keyword| haystack.contains(keyword.as_str()))
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snaplog_protocol::{GenerationAttempt, GenerationError, GenerationPurpose};

    fn draft(model: &str, text: &str) -> Draft {
        Draft {
            model: model.to_string(),
            text: text.to_string(),
            attempt: GenerationAttempt {
                purpose: GenerationPurpose::Draft,
                model: model.to_string(),
                prompt_chars: 0,
                image_count: 0,
                output: text.to_string(),
            },
        }
    }

    fn validator(config: SnaplogConfig) -> CrossValidator {
        CrossValidator::from_config(&config)
    }

    #[test]
    fn whitespace_only_differences_keep_primary() {
        let validator = validator(SnaplogConfig::default());
        let (chosen, record) = validator.select(
            draft("gpt-4o-mini", "<f1>Coffee.</f1>  <f2>Walk.</f2>"),
            Ok(draft("gpt-4o", "<f1>Coffee.</f1>\n<f2>Walk.</f2>")),
            "gpt-4o",
            0.4,
        );
        assert_eq!(chosen.model, "gpt-4o-mini");
        assert_eq!(record.decision, CrossValidationDecision::KeptPrimary);
    }

    #[test]
    fn divergent_drafts_take_alternate() {
        let validator = validator(SnaplogConfig::default());
        let (chosen, record) = validator.select(
            draft("gpt-4o-mini", "<f1>Coffee.</f1>"),
            Ok(draft("gpt-4o", "<f1>Tea.</f1>")),
            "gpt-4o",
            0.4,
        );
        assert_eq!(chosen.text, "<f1>Tea.</f1>");
        assert_eq!(record.decision, CrossValidationDecision::SelectedAlternate);
    }

    #[test]
    fn failed_alternate_is_recorded() {
        let validator = validator(SnaplogConfig::default());
        let (chosen, record) = validator.select(
            draft("gpt-4o-mini", "<f1>Coffee.</f1>"),
            Err(StageFailure::Service(crate::throttle::ThrottleError::Service(
                GenerationError::Provider("boom".to_string()),
            ))),
            "gpt-4o",
            0.4,
        );
        assert_eq!(chosen.model, "gpt-4o-mini");
        assert_eq!(record.decision, CrossValidationDecision::AlternateFailed);
        assert_eq!(record.alternate_error.as_deref(), Some("provider error: boom"));
    }

    #[test]
    fn plan_respects_configuration() {
        let mut config = SnaplogConfig::default();
        config.generation.alt_text_model = Some(config.generation.text_model.clone());
        assert!(matches!(
            validator(config.clone()).plan(&[]),
            CrossValidationPlan::Skip(CrossValidationRecord {
                decision: CrossValidationDecision::SkippedNoAlternate,
                ..
            })
        ));

        config.generation.alt_text_model = Some("gpt-4o".to_string());
        config.pipeline.cross_validation.min_score = 0.9;
        assert!(matches!(
            validator(config.clone()).plan(&[ObservationFrame::empty(1)]),
            CrossValidationPlan::Skip(CrossValidationRecord {
                decision: CrossValidationDecision::SkippedLowScore,
                ..
            })
        ));

        config.pipeline.cross_validation.enabled = false;
        assert!(matches!(
            validator(config).plan(&[]),
            CrossValidationPlan::Skip(CrossValidationRecord {
                decision: CrossValidationDecision::SkippedDisabled,
                ..
            })
        ));
    }

    #[test]
    fn score_mixes_richness_and_keywords() {
        let keywords = vec!["coffee".to_string()];
        let rich = ObservationFrame {
            summary: "Coffee on a table".to_string(),
            elements: vec!["cup".to_string()],
            indoor_outdoor: IndoorOutdoor::Indoor,
            time_hint: TimeOfDay::Morning,
            ..ObservationFrame::empty(1)
        };
        let bare = ObservationFrame::empty(2);
        let score = heuristic_score(&[rich, bare], &keywords);
        assert!((score - (0.5 * 0.25 + 0.5 * 0.5)).abs() < 1e-6);
        assert_eq!(heuristic_score(&[], &keywords), 0.0);
    }
}

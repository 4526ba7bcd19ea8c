//! Deterministic reconstruction of ordered narrative text from `<fN>` spans.

use super::cleanup::TextCleaner;
use crate::timeline::transition_label;
use log::debug;
use regex::Regex;
use snaplog_protocol::{DayBreak, IndoorOutdoor, ObservationFrame};
use std::collections::HashMap;

const LEADING_TRANSITION: &str = r"(?i)^(?:the\s+next\s+day|the\s+following\s+day|next\s+day|the\s+day\s+after|two\s+days\s+later|three\s+days\s+later|a\s+few\s+days\s+later|several\s+days\s+later|\d+\s+days\s+later)\s*[,.:;]?\s*";
const TRANSITION: &str = r"(?i)\b(?:the\s+next\s+day|the\s+following\s+day|two\s+days\s+later|three\s+days\s+later|a\s+few\s+days\s+later|\d+\s+days\s+later)\b";

/// Enforces frame order and day-transition labels on tagged drafts.
#[derive(Debug, Clone)]
pub struct Stitcher {
    cleaner: TextCleaner,
    tags: Regex,
    leading_transition: Regex,
    transition: Regex,
}

impl Stitcher {
    pub fn new(cleaner: TextCleaner) -> Result<Self, regex::Error> {
        Ok(Self {
            cleaner,
            tags: Regex::new(r"(?i)</?f\d+>")?,
            leading_transition: Regex::new(LEADING_TRANSITION)?,
            transition: Regex::new(TRANSITION)?,
        })
    }

    pub fn cleaner(&self) -> &TextCleaner {
        &self.cleaner
    }

    /// Rebuild the paragraph from spans `<f1>` through `<fN>`.
    ///
    /// Returns `None` when any span is missing or empty. Each break position
    /// gets exactly one canonical label.
    pub fn reconstruct(
        &self,
        text: &str,
        frame_count: usize,
        day_breaks: &[DayBreak],
    ) -> Option<String> {
        if frame_count == 0 {
            return None;
        }
        let spans = (1..=frame_count)
            .map(|index| extract_span(text, index))
            .collect::<Option<Vec<_>>>()?;
        let labels: HashMap<usize, String> = day_breaks
            .iter()
            .filter_map(|day_break| {
                transition_label(day_break.day_delta).map(|label| (day_break.position, label))
            })
            .collect();

        // Model-written transitions are dropped everywhere; only break
        // positions get a label.
        let parts: Vec<String> = spans
            .into_iter()
            .enumerate()
            .filter_map(|(idx, span)| {
                let span = self.tags.replace_all(span, " ");
                let rest = self.leading_transition.replace(span.trim(), "");
                let rest = rest.trim();
                match labels.get(&(idx + 1)) {
                    Some(label) => Some(labelled(label, rest)),
                    None if rest.is_empty() => None,
                    None => Some(upper_first(rest)),
                }
            })
            .collect();
        Some(self.cleaner.clean(&parts.join(" ")))
    }

    /// Reconstruct and require a transition phrase whenever the batch spans
    /// more than one day.
    pub fn stitch(
        &self,
        text: &str,
        frame_count: usize,
        day_breaks: &[DayBreak],
    ) -> Option<String> {
        let Some(stitched) = self.reconstruct(text, frame_count, day_breaks) else {
            debug!("tag reconstruction failed (frames={frame_count})");
            return None;
        };
        if !day_breaks.is_empty() && !self.has_transition(&stitched) {
            debug!(
                "stitched text lacks transition labels (breaks={})",
                day_breaks.len()
            );
            return None;
        }
        Some(stitched)
    }

    /// Cleanup for already-stitched text; idempotent.
    pub fn polish(&self, text: &str) -> String {
        let untagged = self.tags.replace_all(text, " ");
        self.cleaner.clean(&untagged)
    }

    pub fn has_transition(&self, text: &str) -> bool {
        self.transition.is_match(text)
    }

    /// Count of transition phrases in `text`.
    pub fn transition_count(&self, text: &str) -> usize {
        self.transition.find_iter(text).count()
    }

    /// Template draft built from frame fields, already tagged.
    pub fn fallback_tagged(&self, frames: &[ObservationFrame]) -> String {
        frames
            .iter()
            .enumerate()
            .map(|(idx, frame)| {
                let index = idx + 1;
                format!("<f{index}>{}</f{index}>", self.frame_sentence(frame))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Deterministic paragraph used when the model's draft cannot be stitched.
    /// Never calls the generation service.
    pub fn compose_fallback(&self, frames: &[ObservationFrame], day_breaks: &[DayBreak]) -> String {
        let tagged = self.fallback_tagged(frames);
        let stitched = self
            .reconstruct(&tagged, frames.len(), day_breaks)
            .unwrap_or_else(|| self.polish(&tagged));
        self.cleaner.soften(&stitched)
    }

    fn frame_sentence(&self, frame: &ObservationFrame) -> String {
        let summary = self.cleaner.clean(&frame.summary);
        let body = if summary.is_empty() {
            match frame.indoor_outdoor {
                IndoorOutdoor::Indoor => "Spent a moment looking around inside".to_string(),
                IndoorOutdoor::Outdoor => "Paused to take in the view outside".to_string(),
                IndoorOutdoor::Unknown => "Paused for a moment to take in the scene".to_string(),
            }
        } else {
            summary
        };
        let mut sentence = match frame
            .place_hint
            .as_deref()
            .map(str::trim)
            .filter(|place| !place.is_empty())
        {
            Some(place) => format!("At the {place}, {}", lower_first(&body)),
            None => body,
        };
        if !sentence.ends_with(['.', '!', '?']) {
            sentence.push('.');
        }
        sentence
    }
}

fn labelled(label: &str, rest: &str) -> String {
    if rest.is_empty() {
        return format!("{label}.");
    }
    format!("{label}, {}", lower_first(rest))
}

/// Body of the first `<fN>…</fN>` span, matched case-insensitively.
fn extract_span(text: &str, index: usize) -> Option<&str> {
    let lower = text.to_ascii_lowercase();
    let open = format!("<f{index}>");
    let close = format!("</f{index}>");
    let start = lower.find(&open)? + open.len();
    let end = start + lower[start..].find(&close)?;
    let span = text[start..end].trim();
    (!span.is_empty()).then_some(span)
}

/// Lowercase the first letter unless it starts an acronym or "I".
fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let keep = chars
        .next()
        .is_none_or(|second| !second.is_lowercase());
    if keep {
        return text.to_string();
    }
    first.to_lowercase().chain(text[first.len_utf8()..].chars()).collect()
}

fn upper_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

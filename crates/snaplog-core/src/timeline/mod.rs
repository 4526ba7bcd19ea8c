//! Timestamp resolution, chronological sequencing and day-boundary detection.

mod day_breaks;
mod exif;
mod parse;
mod resolver;
mod sequencer;

pub use day_breaks::{detect_day_breaks, transition_label};
pub use exif::read_capture_time;
pub use parse::{FilenamePatterns, parse_text, parse_timestamp};
pub use resolver::{COMPANION_KEYS, PRE_EXTRACTED_KEYS, TimestampResolver};
pub use sequencer::{date_sequence, ordering_trace, sequence, shift_to_target_date};

use snaplog_protocol::{
    CompanionRecord, DayBreak, OrderingTrace, PhotoInput, SequencedPhoto,
};

/// Ordered batch with its date map.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub photos: Vec<SequencedPhoto>,
    pub date_sequence: Vec<String>,
    pub day_breaks: Vec<DayBreak>,
    pub ordering: Vec<OrderingTrace>,
}

impl Timeline {
    /// Resolve, optionally shift, sequence and scan a batch in one pass.
    pub fn build(
        resolver: &TimestampResolver,
        photos: Vec<PhotoInput>,
        companions: &[CompanionRecord],
        target_date: Option<chrono::NaiveDate>,
    ) -> Self {
        let mut resolved = resolver.resolve_batch(&photos, companions);
        if let Some(target) = target_date {
            shift_to_target_date(&mut resolved, target);
        }
        let photos = sequence(photos, resolved);
        let date_sequence = date_sequence(&photos);
        let day_breaks = detect_day_breaks(&date_sequence);
        let ordering = ordering_trace(&photos);
        Self {
            photos,
            date_sequence,
            day_breaks,
            ordering,
        }
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}

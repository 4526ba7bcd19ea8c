//! Priority cascade choosing one capture instant per photo.

use super::exif::read_capture_time;
use super::parse::{FilenamePatterns, parse_timestamp};
use crate::error::SnaplogCoreError;
use crate::media::local_bytes;
use chrono::{DateTime, FixedOffset};
use log::debug;
use snaplog_config::TimelineConfig;
use snaplog_protocol::{
    CompanionRecord, PhotoInput, ResolvedTimestamp, TimestampSource, TimestampValue,
};

/// Client metadata keys, checked in order.
pub const PRE_EXTRACTED_KEYS: &[&str] = &[
    "order_ts",
    "shotAt",
    "takenAt",
    "timestamp",
    "time",
    "fileCreatedAt",
];

/// Companion summary keys, checked in order.
pub const COMPANION_KEYS: &[&str] = &[
    "time",
    "takenAt",
    "timestamp",
    "fileCreatedAt",
    "createdAt",
    "created_at",
    "sentAt",
    "sent_at",
    "messageTime",
    "message_time",
    "kakaoTime",
    "kakao_time",
];

/// Resolves one canonical capture instant per photo.
///
/// Sources are tried in strict priority order and the first one that parses
/// wins. Within a source only the first present key is considered.
#[derive(Debug, Clone)]
pub struct TimestampResolver {
    offset: FixedOffset,
    filenames: FilenamePatterns,
}

impl TimestampResolver {
    pub fn new(offset: FixedOffset) -> Result<Self, SnaplogCoreError> {
        Ok(Self {
            offset,
            filenames: FilenamePatterns::new()?,
        })
    }

    pub fn from_config(config: &TimelineConfig) -> Result<Self, SnaplogCoreError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            SnaplogCoreError::Parse(format!(
                "utc offset out of range: {} minutes",
                config.utc_offset_minutes
            ))
        })?;
        Self::new(offset)
    }

    /// Reference offset for zone-less values and calendar dates.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Resolve a single photo against its aligned companion record.
    pub fn resolve(
        &self,
        photo: &PhotoInput,
        companion: Option<&CompanionRecord>,
    ) -> Option<ResolvedTimestamp> {
        let resolved = TimestampSource::PRIORITY.iter().find_map(|source| {
            self.candidate(*source, photo, companion)
                .map(|instant| ResolvedTimestamp {
                    instant,
                    source: *source,
                })
        });
        match &resolved {
            Some(resolved) => debug!(
                "timestamp resolved (index={}, source={}, instant={})",
                photo.original_index,
                resolved.source,
                resolved.instant.to_rfc3339()
            ),
            None => debug!(
                "timestamp unresolved (index={})",
                photo.original_index
            ),
        }
        resolved
    }

    /// Resolve a batch; companion records are aligned by position.
    pub fn resolve_batch(
        &self,
        photos: &[PhotoInput],
        companions: &[CompanionRecord],
    ) -> Vec<Option<ResolvedTimestamp>> {
        photos
            .iter()
            .enumerate()
            .map(|(idx, photo)| self.resolve(photo, companions.get(idx)))
            .collect()
    }

    fn candidate(
        &self,
        source: TimestampSource,
        photo: &PhotoInput,
        companion: Option<&CompanionRecord>,
    ) -> Option<DateTime<FixedOffset>> {
        match source {
            TimestampSource::PreExtracted => {
                let value = PRE_EXTRACTED_KEYS
                    .iter()
                    .find_map(|key| photo.metadata.get(*key).and_then(TimestampValue::from_json))?;
                parse_timestamp(&value, self.offset)
            }
            TimestampSource::CompanionSummary => {
                let record = companion?;
                let value = COMPANION_KEYS
                    .iter()
                    .find_map(|key| record.field(key).and_then(TimestampValue::from_json))?;
                parse_timestamp(&value, self.offset)
            }
            TimestampSource::FilenamePattern => {
                let name = photo.file_name.as_deref()?;
                self.filenames.parse(name, self.offset)
            }
            TimestampSource::EmbeddedMetadata => {
                let bytes = local_bytes(photo)?;
                read_capture_time(&bytes, self.offset)
            }
        }
    }
}

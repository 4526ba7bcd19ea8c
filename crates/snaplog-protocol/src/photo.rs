//! Photo inputs, candidate timestamps, and the sequenced timeline.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Raw image payload as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PhotoData {
    /// Encoded image bytes (JPEG, PNG, WebP, HEIC, ...).
    Bytes(Vec<u8>),
    /// A `data:image/...;base64,` URL.
    DataUrl(String),
    /// A remote URL the generation service can fetch itself.
    Url(String),
}

/// A single photo in the submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoInput {
    /// Arrival order within the batch (0-based).
    pub original_index: usize,
    /// Original file name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Image payload.
    pub data: PhotoData,
    /// Client-side metadata (e.g. `shotAt`, `takenAt`, `order_ts`).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl PhotoInput {
    /// Create a photo with no file name or metadata.
    pub fn new(original_index: usize, data: PhotoData) -> Self {
        Self {
            original_index,
            file_name: None,
            data,
            metadata: Map::new(),
        }
    }

    /// Attach the original file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Attach a client metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the client-known capture time under the `shotAt` key.
    pub fn with_captured_at(self, value: impl Into<Value>) -> Self {
        self.with_metadata("shotAt", value)
    }
}

/// Sidecar summary record aligned with the photo at the same index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanionRecord(pub Map<String, Value>);

impl CompanionRecord {
    /// Look up a raw field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a trimmed, non-empty string field.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

impl From<Map<String, Value>> for CompanionRecord {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// A candidate timestamp value before parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    /// Unix epoch in seconds or milliseconds.
    Epoch(f64),
    /// Any textual date/time layout.
    Text(String),
}

impl TimestampValue {
    /// Convert a JSON value into a candidate, ignoring nulls, empty strings and
    /// non-scalar values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_f64().map(Self::Epoch),
            Value::String(text) if !text.trim().is_empty() => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

/// Where a resolved timestamp came from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Client-supplied capture time.
    PreExtracted,
    /// Companion summary record at the same index.
    CompanionSummary,
    /// Date/time digits embedded in the file name.
    FilenamePattern,
    /// Metadata embedded in the image binary (EXIF).
    EmbeddedMetadata,
}

impl TimestampSource {
    /// All sources from highest to lowest priority.
    pub const PRIORITY: [TimestampSource; 4] = [
        TimestampSource::PreExtracted,
        TimestampSource::CompanionSummary,
        TimestampSource::FilenamePattern,
        TimestampSource::EmbeddedMetadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampSource::PreExtracted => "pre_extracted",
            TimestampSource::CompanionSummary => "companion_summary",
            TimestampSource::FilenamePattern => "filename_pattern",
            TimestampSource::EmbeddedMetadata => "embedded_metadata",
        }
    }
}

impl fmt::Display for TimestampSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single capture instant chosen for a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTimestamp {
    /// Capture instant in the reference offset.
    pub instant: DateTime<FixedOffset>,
    /// Source that produced the instant.
    pub source: TimestampSource,
}

impl ResolvedTimestamp {
    /// Calendar date of the instant in its own offset.
    pub fn calendar_date(&self) -> NaiveDate {
        self.instant.date_naive()
    }
}

/// A photo placed at its final position in the chronological sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedPhoto {
    /// Original photo input.
    pub photo: PhotoInput,
    /// Resolved timestamp, if any source parsed.
    pub resolved: Option<ResolvedTimestamp>,
    /// `YYYY-MM-DD`, or empty for undated photos.
    pub resolved_date: String,
    /// 1-based sequence position.
    pub position: usize,
}

/// A calendar-date advance between two consecutive positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBreak {
    /// 1-based position of the later photo.
    pub position: usize,
    /// Whole calendar days between the two photos (always >= 1).
    pub day_delta: i64,
}

/// Per-photo record of how its position was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingTrace {
    pub original_index: usize,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TimestampSource>,
    /// RFC 3339 rendering of the resolved instant, or empty.
    #[serde(default)]
    pub parsed: String,
}

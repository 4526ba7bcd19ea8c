use serde_json::{Map, Value, json};
use snaplog_protocol::{CompanionRecord, PhotoData, PhotoInput};

/// A JPEG SOI/APP0 header; enough for mime sniffing, no EXIF.
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

pub fn photo(original_index: usize) -> PhotoInput {
    PhotoInput::new(original_index, PhotoData::Bytes(JPEG_BYTES.to_vec()))
}

/// Photo with a client-supplied capture time.
pub fn photo_at(original_index: usize, shot_at: impl Into<Value>) -> PhotoInput {
    photo(original_index).with_captured_at(shot_at)
}

pub fn photo_named(original_index: usize, file_name: &str) -> PhotoInput {
    photo(original_index).with_file_name(file_name)
}

pub fn companion(fields: &[(&str, &str)]) -> CompanionRecord {
    let map: Map<String, Value> = fields
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();
    CompanionRecord::from(map)
}

/// Observation reply with one frame per summary.
pub fn observation_json(summaries: &[&str]) -> String {
    let frames: Vec<Value> = summaries
        .iter()
        .enumerate()
        .map(|(idx, summary)| {
            json!({
                "index": idx + 1,
                "summary": summary,
                "elements": [],
                "indoor_outdoor": "unknown",
                "time_hint": "unknown",
                "place_hint": "",
                "visible_text": "",
                "flow": "unknown"
            })
        })
        .collect();
    json!({
        "frames": frames,
        "global": { "dominant_time": "unknown", "movement": "unknown" }
    })
    .to_string()
}

/// `<f1>a</f1> <f2>b</f2> ...` in the given order of `(index, text)` pairs.
pub fn tagged_draft(spans: &[(usize, &str)]) -> String {
    spans
        .iter()
        .map(|(index, text)| format!("<f{index}>{text}</f{index}>"))
        .collect::<Vec<_>>()
        .join(" ")
}

//! Structured per-photo observations returned by the vision stage.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Whether a scene is inside or outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndoorOutdoor {
    Indoor,
    Outdoor,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Coarse time-of-day hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Noon,
    Afternoon,
    Evening,
    Night,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Noon => "noon",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
            TimeOfDay::Unknown => "unknown",
        }
    }
}

/// Whether the subject is moving between places or staying put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Moving,
    Staying,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Batch-level movement hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Yes,
    No,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One ranked guess at a dish name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameCandidate {
    pub name: String,
    /// Confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f32,
    /// What in the scene supports the guess.
    #[serde(default)]
    pub evidence: String,
}

/// Food-specific details, only requested for single-photo batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodObservation {
    #[serde(default)]
    pub has_food: bool,
    #[serde(default)]
    pub has_drink: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_style: Option<String>,
    #[serde(default)]
    pub visible_ingredients: Vec<String>,
    /// Sorted by descending confidence.
    #[serde(default)]
    pub name_candidates: Vec<NameCandidate>,
}

/// Structured record for one photo, indexed by sequence position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationFrame {
    /// 1-based sequence position. Echoed values are ignored on input.
    #[serde(default, skip_deserializing)]
    pub index: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elements: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub indoor_outdoor: IndoorOutdoor,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_hint: TimeOfDay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_relations: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_text: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub flow: Flow,
    /// A malformed food block is dropped without affecting the frame.
    #[serde(
        default,
        deserialize_with = "lenient_food",
        skip_serializing_if = "Option::is_none"
    )]
    pub food: Option<FoodObservation>,
}

impl ObservationFrame {
    /// A frame with nothing observed.
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn has_visible_text(&self) -> bool {
        self.visible_text
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_food<'de, D>(deserializer: D) -> Result<Option<FoodObservation>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

/// Hints that apply to the whole batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationGlobal {
    #[serde(default)]
    pub dominant_time: TimeOfDay,
    #[serde(default)]
    pub movement: Movement,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unknown_enum_values_fall_back_to_unknown() {
        let frame: ObservationFrame = serde_json::from_value(json!({
            "index": 4,
            "summary": "walked along the river",
            "indoor_outdoor": "semi-outdoor",
            "time_hint": "dusk",
            "flow": "moving"
        }))
        .expect("frame");

        assert_eq!(frame.indoor_outdoor, IndoorOutdoor::Unknown);
        assert_eq!(frame.time_hint, TimeOfDay::Unknown);
        assert_eq!(frame.flow, Flow::Moving);
        assert!(frame.food.is_none());
    }

    #[test]
    fn echoed_index_and_null_fields_keep_frame_content() {
        let frame: ObservationFrame = serde_json::from_value(json!({
            "index": "2",
            "summary": null,
            "elements": ["bench"],
            "time_hint": null,
            "place_hint": "riverside"
        }))
        .expect("frame");

        assert_eq!(frame.index, 0);
        assert_eq!(frame.summary, "");
        assert_eq!(frame.elements, vec!["bench".to_string()]);
        assert_eq!(frame.time_hint, TimeOfDay::Unknown);
        assert_eq!(frame.place_hint.as_deref(), Some("riverside"));
    }

    #[test]
    fn malformed_food_block_is_dropped_alone() {
        let frame: ObservationFrame = serde_json::from_value(json!({
            "summary": "bowl of ramen",
            "food": { "has_food": true, "name_candidates": [{ "confidence": 0.4 }] }
        }))
        .expect("frame");

        assert_eq!(frame.summary, "bowl of ramen");
        assert!(frame.food.is_none());
    }

    #[test]
    fn visible_text_must_be_non_blank() {
        let mut frame = ObservationFrame::empty(1);
        assert!(!frame.has_visible_text());
        frame.visible_text = Some("   ".to_string());
        assert!(!frame.has_visible_text());
        frame.visible_text = Some("OPEN".to_string());
        assert!(frame.has_visible_text());
    }
}

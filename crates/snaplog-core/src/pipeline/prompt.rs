//! Prompt text for each generation purpose.

use crate::timeline::transition_label;
use snaplog_protocol::{
    DayBreak, Flow, IndoorOutdoor, LengthBucket, Movement, ObservationFrame, ObservationGlobal,
    TimeOfDay,
};

pub const OBSERVATION_SYSTEM: &str =
    "You are an observer who records what is visible, factually and without guessing.";

pub const DRAFT_SYSTEM: &str = "You write short first-person diary entries in a natural, spoken \
register. Keep it plain and concise, with few sensory details and no exaggeration, \
onomatopoeia or metaphor. Always keep the input frame order and state the day transition \
wherever the date changes.";

pub const REFINE_SYSTEM: &str =
    "You are an editor who polishes diary text so it reads as if it were spoken.";

pub const SUMMARY_LINES_SYSTEM: &str = "You write short first-person diary entries in a natural, \
spoken register.";

const FOOD_FIELDS: &str = "      \"food\": {\"has_food\": true|false, \"has_drink\": true|false, \
\"serving_style\": \"single dish|course|side|...\", \"visible_ingredients\": [\"...\"], \
\"name_candidates\": [{\"name\": \"...\", \"confidence\": 0.0-1.0, \"evidence\": \"...\"}]},\n";

/// Structured-observation request for `count` images.
pub fn observation_prompt(count: usize, include_food: bool) -> String {
    let mut prompt = String::from(
        "Observe the images below **without guessing** and summarise them as JSON.\n\
         - No meta wording (photo, image, picture, shot). Never mention file names or dates.\n\
         - Do not infer gender or head count. Leave out anything uncertain.\n\
         - For each image give: a one-line summary, visible elements, indoor_outdoor, a coarse \
         time_hint, a one-word place_hint if visible, space_relations (background, distance, \
         line of sight, briefly), visible_text and a flow hint.\n\
         - Record proper nouns (menu items, place names) only when they are visibly written.\n\
         - Do not guess outdoor, home or cafe settings. Words such as park, bench, wind, sky, \
         window, cafe or coffee are allowed only when visible.\n\
         - visible_text: characters actually visible (signs, labels, menus). Empty string if none.\n",
    );
    if include_food {
        prompt.push_str(
            "- If food or drink is present, fill the food block. Name a dish only when a menu \
             or label shows it; otherwise give low-confidence candidates with the evidence.\n",
        );
    }
    prompt.push_str("\nJSON format:\n{\n  \"frames\": [\n    {\"index\": 1, \"summary\": \"...\", \"elements\": [\"...\"],\n");
    prompt.push_str(
        "      \"indoor_outdoor\": \"indoor|outdoor|unknown\",\n\
         \x20     \"time_hint\": \"morning|noon|afternoon|evening|night|unknown\",\n\
         \x20     \"place_hint\": \"one word if visible, else empty\",\n\
         \x20     \"space_relations\": \"...\",\n\
         \x20     \"visible_text\": \"visible text, else empty\",\n",
    );
    if include_food {
        prompt.push_str(FOOD_FIELDS);
    }
    prompt.push_str(
        "      \"flow\": \"moving|staying|unknown\"}\n\
         \x20 ],\n\
         \x20 \"global\": {\"dominant_time\": \"morning|noon|afternoon|evening|night|unknown\", \
         \"movement\": \"yes|no|unknown\"}\n}\n",
    );
    prompt.push_str(&format!(
        "**Important**: the {count} images are given in ascending capture order. That order is \
         authoritative: keep it exactly in `frames`, one frame per image."
    ));
    prompt
}

/// Inputs for the draft prompt.
#[derive(Debug, Clone, Copy)]
pub struct DraftContext<'a> {
    pub frames: &'a [ObservationFrame],
    pub global: ObservationGlobal,
    pub day_breaks: &'a [DayBreak],
    pub tone: &'a str,
    pub length: LengthBucket,
}

pub fn draft_prompt(ctx: &DraftContext<'_>) -> String {
    let bullets: Vec<String> = ctx
        .frames
        .iter()
        .filter_map(|frame| {
            let mut parts = Vec::new();
            if !frame.summary.is_empty() {
                parts.push(frame.summary.clone());
            }
            match frame.indoor_outdoor {
                IndoorOutdoor::Indoor => parts.push("(indoor)".to_string()),
                IndoorOutdoor::Outdoor => parts.push("(outdoor)".to_string()),
                IndoorOutdoor::Unknown => {}
            }
            if frame.time_hint != TimeOfDay::Unknown {
                parts.push(format!("[{}]", frame.time_hint.as_str()));
            }
            if let Some(place) = &frame.place_hint {
                parts.push(format!("#{place}"));
            }
            match frame.flow {
                Flow::Moving => parts.push("{moving}".to_string()),
                Flow::Staying => parts.push("{staying}".to_string()),
                Flow::Unknown => {}
            }
            (!parts.is_empty()).then(|| format!("- frame {}: {}", frame.index, parts.join(" ")))
        })
        .collect();
    let observations = if bullets.is_empty() {
        "- few clues".to_string()
    } else {
        bullets.join("\n")
    };
    let movement = match ctx.global.movement {
        Movement::Yes => "yes",
        Movement::No => "no",
        Movement::Unknown => "unknown",
    };
    let transitions = transition_context(ctx.day_breaks);
    let sentences = ctx.length.sentence_rule();
    let count = ctx.frames.len();
    format!(
        "Write a natural diary entry as **one paragraph** from the observation clues below.\n\n\
         [flow] time: {dominant} movement: {movement}\n\
         [observations]\n{observations}\n{transitions}\n\
         [rules]\n\
         - Past tense throughout. First-person experience without starting sentences with \"I\".\n\
         - Length: {sentences}. Include one or two short sentences.\n\
         - When the time-flow section lists a date change, mark it at that frame with the given \
         phrase (\"The next day\", \"Two days later\", \"N days later\").\n\
         - At most two sensory details and at most one sentence of emotion, implied through action.\n\
         - Use proper nouns for food or places only when visible. Never invent substitutes.\n\
         - No crowds, sounds or smells unless people are visible.\n\
         - No meta wording (photo, image, picture), no file names, no dates.\n\
         - Tone: {tone} (no exaggeration).\n\n\
         [output format]\n\
         - The text for frame i must start with <fi> and end with </fi>, for every i from 1 to {count}, in order.\n\
         - Several sentences for the same frame may share one tag.\n\
         - Tags are removed from the final result.",
        dominant = ctx.global.dominant_time.as_str(),
        tone = ctx.tone,
    )
}

fn transition_context(day_breaks: &[DayBreak]) -> String {
    let lines: Vec<String> = day_breaks
        .iter()
        .filter_map(|day_break| {
            transition_label(day_break.day_delta)
                .map(|label| format!("- from frame {}: {label}", day_break.position))
        })
        .collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n[time flow]\n{}\n", lines.join("\n"))
    }
}

pub fn refine_prompt(tagged: &str, tone: &str, length: LengthBucket) -> String {
    format!(
        "[draft]\n{tagged}\n\n\
         [editing rules]\n\
         - Keep first-person experience and past tense. Turn observation phrases (\"could be seen\") \
         into actions (\"looked at it for a while\").\n\
         - Add light connectives between scenes (then, a little later, after a while) to suggest \
         the passage of time.\n\
         - Remove abstract filler such as \"an everyday scene\" or \"a special time\".\n\
         - Vary sentence length and endings. No exaggeration, metaphor or meta wording.\n\
         - No proper nouns for dishes or places that are not visible.\n\
         - Length: {sentences}. Tone: {tone}.\n\n\
         [output]\n\
         - One paragraph only.\n\
         - Keep every <fN>...</fN> tag from the draft around the text for the same frame, in the same order.",
        sentences = length.sentence_rule(),
    )
}

pub fn summary_lines_prompt(lines: &[String], tone: &str, length: LengthBucket) -> String {
    let clues = lines
        .iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "[observation clues]\n{clues}\n\n\
         [rules]\n\
         - Write the way people talk. Mix short and long sentences.\n\
         - Past tense throughout.\n\
         - Focus on action and sensation. No exaggeration.\n\
         - No meta wording, dates or file names. Do not infer gender or head count.\n\
         - Length: {sentences}.\n\
         - Tone: {tone}.\n\
         - Output a single paragraph.",
        sentences = length.sentence_rule(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn food_block_only_for_single_photos() {
        assert!(observation_prompt(1, true).contains("\"food\""));
        assert!(!observation_prompt(3, false).contains("\"food\""));
        assert!(observation_prompt(3, false).contains("the 3 images"));
    }

    #[test]
    fn draft_prompt_lists_breaks_and_tags() {
        let frames = vec![
            ObservationFrame {
                summary: "coffee by the window".to_string(),
                ..ObservationFrame::empty(1)
            },
            ObservationFrame::empty(2),
        ];
        let breaks = [DayBreak {
            position: 2,
            day_delta: 3,
        }];
        let prompt = draft_prompt(&DraftContext {
            frames: &frames,
            global: ObservationGlobal::default(),
            day_breaks: &breaks,
            tone: "calm",
            length: LengthBucket::Long,
        });
        assert!(prompt.contains("- frame 1: coffee by the window"));
        assert!(prompt.contains("- from frame 2: 3 days later"));
        assert!(prompt.contains("for every i from 1 to 2"));
        assert!(prompt.contains("5-7 sentences"));
    }
}

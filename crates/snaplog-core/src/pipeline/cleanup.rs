//! Banned-vocabulary cleanup applied to every piece of generated text.

use regex::Regex;
use snaplog_protocol::ObservationFrame;

const FILE_PATTERN: &str = r"(?i)\b[\w\-]+\.(?:jpe?g|png|webp|heic|heif|gif)\b";
const NUMERIC_DATE_PATTERN: &str =
    r"\b20\d{2}\s*[-./]\s*\d{1,2}\s*[-./]\s*\d{1,2}\.?(?:\s*\d{1,2}:\d{2}(?::\d{2})?)?|\b20\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])\b";
const MONTH_NAMES: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec";
const BANNED_PATTERN: &str = r"(?i)\b(?:photos?|photographs?|images?|pictures?|snapshots?|screenshots?|unknown|not identified|current time)\b";

/// Phrases that read like a report rather than a diary.
const REPORT_PHRASES: &[&str] = &[
    "filled with an everyday atmosphere",
    "was visually pleasing as well",
    "was visually pleasing",
    "added a commercial feel",
    "an ordinary everyday scene",
];

const MAX_PASSES: usize = 8;

/// Brand names replaced by a generic noun when nothing in the frames shows
/// readable text.
const BRANDS: &[(&str, &str)] = &[
    (r"(?i)\bstarbucks\b", "cafe"),
    (r"(?i)\bdunkin(?:'?\s+donuts)?\b", "cafe"),
    (r"(?i)\bediya\b", "cafe"),
    (r"(?i)\btwosome(?:\s+place)?\b", "cafe"),
    (r"(?i)\bparis\s+baguette\b", "bakery"),
    (r"(?i)\bmcdonald'?s\b", "fast-food place"),
    (r"(?i)\blotteria\b", "fast-food place"),
    (r"(?i)\bburger\s+king\b", "fast-food place"),
];

#[derive(Debug, Clone)]
pub struct TextCleaner {
    file_names: Regex,
    numeric_dates: Regex,
    month_dates: Regex,
    banned: Regex,
    space_before_punct: Regex,
    repeated_punct: Regex,
    whitespace: Regex,
    brands: Vec<(Regex, &'static str)>,
}

impl TextCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        let month_dates = format!(
            r"\b(?:(?:{MONTH_NAMES})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?(?:,?\s*20\d{{2}})?|\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTH_NAMES})\.?,?\s+20\d{{2}})\b"
        );
        let brands = BRANDS
            .iter()
            .map(|(pattern, generic)| Regex::new(pattern).map(|regex| (regex, *generic)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            file_names: Regex::new(FILE_PATTERN)?,
            numeric_dates: Regex::new(NUMERIC_DATE_PATTERN)?,
            month_dates: Regex::new(&month_dates)?,
            banned: Regex::new(BANNED_PATTERN)?,
            space_before_punct: Regex::new(r"\s+([.,!?;:])")?,
            repeated_punct: Regex::new(r"([,;:])(?:\s*[,;:])+|,\s*\.")?,
            whitespace: Regex::new(r"\s+")?,
            brands,
        })
    }

    /// Remove file names, explicit dates and banned words, then normalise
    /// whitespace. Runs to a fixpoint so `clean(clean(x)) == clean(x)`.
    pub fn clean(&self, text: &str) -> String {
        let mut current = self.pass(text);
        for _ in 1..MAX_PASSES {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Trim report-tone phrases, then clean.
    pub fn soften(&self, text: &str) -> String {
        let mut softened = text.to_string();
        for phrase in REPORT_PHRASES {
            softened = softened.replace(phrase, "");
        }
        self.clean(&softened)
    }

    /// Swap brand names for generic nouns unless some frame carries visible
    /// text that could justify them.
    pub fn generalize_brands(&self, text: &str, frames: &[ObservationFrame]) -> String {
        if frames.iter().any(ObservationFrame::has_visible_text) {
            return text.to_string();
        }
        self.brands
            .iter()
            .fold(text.to_string(), |acc, (regex, generic)| {
                regex.replace_all(&acc, *generic).into_owned()
            })
    }

    fn pass(&self, text: &str) -> String {
        let text = self.file_names.replace_all(text, "");
        let text = self.numeric_dates.replace_all(&text, "");
        let text = self.month_dates.replace_all(&text, "");
        let text = self.banned.replace_all(&text, "");
        let text = self.whitespace.replace_all(&text, " ");
        let text = self.space_before_punct.replace_all(&text, "$1");
        let text = self.repeated_punct.replace_all(&text, |caps: &regex::Captures<'_>| {
            match caps.get(1) {
                Some(first) => first.as_str().to_string(),
                None => ".".to_string(),
            }
        });
        text.trim()
            .trim_start_matches([',', ';', ':'])
            .trim()
            .to_string()
    }
}

//! Lenient parsing of capture-time values.
//!
//! Every parser returns `None` on bad input. Zone-less values are read in the
//! caller-supplied reference offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use snaplog_protocol::TimestampValue;

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 10_000_000_000.0;

/// Layouts carrying an explicit offset.
const ZONED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
];

/// Zone-less date and time layouts, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y.%m.%d. %H:%M:%S",
    "%Y.%m.%d. %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d-%H-%M-%S",
    "%Y.%m.%d-%H-%M-%S",
    "%Y:%m:%d %H:%M:%S",
    "%Y%m%d_%H%M%S",
    "%Y%m%d%H%M%S",
];

/// Bare date layouts; the time is midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d.", "%Y.%m.%d", "%Y/%m/%d"];

/// Fixed positional patterns for dates embedded in file names, first match wins.
const FILENAME_PATTERNS: &[&str] = &[
    r"(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})[_\- ](?P<H>\d{2})(?P<M>\d{2})(?P<S>\d{2})",
    r"(?P<y>\d{4})[-_.](?P<m>\d{2})[-_.](?P<d>\d{2})[-_ ](?P<H>\d{2})[-_.:](?P<M>\d{2})(?:[-_.:](?P<S>\d{2}))?",
    r"(?P<y>\d{4})\.(?P<m>\d{2})\.(?P<d>\d{2})[ _](?P<H>\d{2})\.(?P<M>\d{2})(?:\.(?P<S>\d{2}))?",
];

/// Parse any supported timestamp value.
pub fn parse_timestamp(
    value: &TimestampValue,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    match value {
        TimestampValue::Epoch(epoch) => from_epoch(*epoch, offset),
        TimestampValue::Text(text) => parse_text(text, offset),
    }
}

/// Parse a textual timestamp: numeric epochs, ISO 8601, regional and compact
/// layouts, EXIF layout, or a bare date.
pub fn parse_text(text: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if (10..=13).contains(&text.len()) && text.bytes().all(|byte| byte.is_ascii_digit()) {
        let raw: i64 = text.parse().ok()?;
        let millis = if text.len() == 13 { raw } else { raw.checked_mul(1000)? };
        return from_millis(millis, offset);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&offset));
    }
    let zoned = match text.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => text.to_string(),
    };
    for format in ZONED_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(&zoned, format) {
            return Some(parsed.with_timezone(&offset));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return localize(naive, offset);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return localize(date.and_hms_opt(0, 0, 0)?, offset);
        }
    }
    None
}

/// Compiled file-name patterns.
#[derive(Debug, Clone)]
pub struct FilenamePatterns {
    patterns: Vec<Regex>,
}

impl FilenamePatterns {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = FILENAME_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Extract a capture time from the basename of `name`.
    ///
    /// A pattern whose digits form an invalid calendar value falls through to
    /// the next pattern.
    pub fn parse(&self, name: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if base.is_empty() {
            return None;
        }
        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.captures(base)?;
            let field = |key: &str| -> Option<u32> {
                captures.name(key).map_or(Some(0), |m| m.as_str().parse().ok())
            };
            let year: i32 = captures.name("y")?.as_str().parse().ok()?;
            let naive = NaiveDate::from_ymd_opt(year, field("m")?, field("d")?)?
                .and_hms_opt(field("H")?, field("M")?, field("S")?)?;
            localize(naive, offset)
        })
    }
}

fn from_epoch(epoch: f64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if !epoch.is_finite() {
        return None;
    }
    let millis = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1000.0
    };
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    from_millis(millis.round() as i64, offset)
}

fn from_millis(millis: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|utc| utc.with_timezone(&offset))
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    offset.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("offset")
    }

    fn rendered(value: Option<DateTime<FixedOffset>>) -> Option<String> {
        value.map(|value| value.format("%Y-%m-%d %H:%M:%S").to_string())
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let seconds = parse_timestamp(&TimestampValue::Epoch(1_704_449_400.0), utc());
        let millis = parse_timestamp(&TimestampValue::Epoch(1_704_449_400_000.0), utc());
        assert_eq!(seconds, millis);
        assert_eq!(rendered(seconds), Some("2024-01-05 10:10:00".to_string()));
    }

    #[test]
    fn numeric_strings_follow_digit_count() {
        assert_eq!(
            rendered(parse_text("1704449400", utc())),
            Some("2024-01-05 10:10:00".to_string())
        );
        assert_eq!(
            rendered(parse_text("1704449400000", utc())),
            Some("2024-01-05 10:10:00".to_string())
        );
    }

    #[test]
    fn accepts_regional_and_compact_layouts() {
        let expected = Some("2024-01-05 10:00:00".to_string());
        for text in [
            "2024-01-05 10:00:00",
            "2024-01-05T10:00:00Z",
            "2024-01-05T10:00:00.250Z",
            "2024-01-05T19:00:00+09:00",
            "2024.01.05 10:00",
            "2024.01.05. 10:00:00",
            "2024/01/05 10:00",
            "2024:01:05 10:00:00",
            "2024-01-05-10-00-00",
            "20240105_100000",
            "20240105100000",
        ] {
            assert_eq!(rendered(parse_text(text, utc())), expected, "{text}");
        }
        assert_eq!(
            rendered(parse_text("2024-01-05", utc())),
            Some("2024-01-05 00:00:00".to_string())
        );
    }

    #[test]
    fn zoneless_values_use_reference_offset() {
        let seoul = FixedOffset::east_opt(9 * 3600).expect("offset");
        let parsed = parse_text("2024-01-05 01:00:00", seoul).expect("parsed");
        assert_eq!(parsed.offset(), &seoul);
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 5).expect("date"));
        assert_eq!(parsed.timestamp(), 1_704_384_000);
    }

    #[test]
    fn garbage_yields_none() {
        for text in ["", "   ", "yesterday", "2024-13-45", "12345"] {
            assert_eq!(parse_text(text, utc()), None, "{text}");
        }
        assert_eq!(parse_timestamp(&TimestampValue::Epoch(f64::NAN), utc()), None);
    }

    #[test]
    fn filename_patterns_skip_invalid_calendar_values() {
        let patterns = FilenamePatterns::new().expect("patterns");
        assert_eq!(
            rendered(patterns.parse("DCIM/IMG_20240105_101500.jpg", utc())),
            Some("2024-01-05 10:15:00".to_string())
        );
        assert_eq!(
            rendered(patterns.parse("Screenshot_2024-01-05-10-15.png", utc())),
            Some("2024-01-05 10:15:00".to_string())
        );
        assert_eq!(
            rendered(patterns.parse("KakaoTalk_2024.01.05_10.15.30.png", utc())),
            Some("2024-01-05 10:15:30".to_string())
        );
        assert_eq!(patterns.parse("IMG_20241345_101500.jpg", utc()), None);
        assert_eq!(patterns.parse("holiday.jpg", utc()), None);
    }
}

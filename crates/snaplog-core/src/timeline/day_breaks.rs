//! Calendar-date changes along the sequence and their transition labels.

use chrono::NaiveDate;
use snaplog_protocol::DayBreak;

/// Scan consecutive positions and record every calendar-date advance.
///
/// A break is attributed to the later position and only emitted when both
/// dates parse and the later one is after the earlier one.
pub fn detect_day_breaks(date_sequence: &[String]) -> Vec<DayBreak> {
    let dates: Vec<Option<NaiveDate>> = date_sequence
        .iter()
        .map(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok())
        .collect();
    dates
        .windows(2)
        .enumerate()
        .filter_map(|(idx, pair)| {
            let (previous, current) = (pair[0]?, pair[1]?);
            let day_delta = current.signed_duration_since(previous).num_days();
            (day_delta >= 1).then_some(DayBreak {
                position: idx + 2,
                day_delta,
            })
        })
        .collect()
}

/// Canonical transition phrase for a day delta.
pub fn transition_label(day_delta: i64) -> Option<String> {
    match day_delta {
        i64::MIN..=0 => None,
        1 => Some("The next day".to_string()),
        2 => Some("Two days later".to_string()),
        days => Some(format!("{days} days later")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dates(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn break_is_attributed_to_later_position() {
        let breaks = detect_day_breaks(&dates(&["2024-01-01", "2024-01-01", "2024-01-04"]));
        assert_eq!(
            breaks,
            vec![DayBreak {
                position: 3,
                day_delta: 3
            }]
        );
        assert_eq!(transition_label(3).as_deref(), Some("3 days later"));
    }

    #[test]
    fn undated_neighbours_never_break() {
        let breaks = detect_day_breaks(&dates(&["2024-01-01", "", "2024-01-02", "2024-01-03"]));
        assert_eq!(
            breaks,
            vec![DayBreak {
                position: 4,
                day_delta: 1
            }]
        );
    }

    #[test]
    fn month_boundaries_use_calendar_subtraction() {
        let breaks = detect_day_breaks(&dates(&["2024-02-28", "2024-03-01"]));
        assert_eq!(breaks[0].day_delta, 2);
        assert_eq!(transition_label(2).as_deref(), Some("Two days later"));
    }

    #[test]
    fn labels_cover_the_vocabulary() {
        assert_eq!(transition_label(0), None);
        assert_eq!(transition_label(-2), None);
        assert_eq!(transition_label(1).as_deref(), Some("The next day"));
        assert_eq!(transition_label(12).as_deref(), Some("12 days later"));
    }

    #[test]
    fn short_sequences_have_no_breaks() {
        assert!(detect_day_breaks(&[]).is_empty());
        assert!(detect_day_breaks(&dates(&["2024-01-01"])).is_empty());
    }
}

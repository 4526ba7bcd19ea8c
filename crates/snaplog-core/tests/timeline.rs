//! Timeline construction across resolution, shifting and sequencing.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use snaplog_config::TimelineConfig;
use snaplog_core::{Timeline, TimestampResolver};
use snaplog_protocol::{DayBreak, TimestampSource};
use snaplog_test_utils::{companion, photo, photo_at, photo_named};

fn resolver() -> TimestampResolver {
    TimestampResolver::from_config(&TimelineConfig::default()).expect("resolver")
}

fn order(timeline: &Timeline) -> Vec<usize> {
    timeline
        .ordering
        .iter()
        .map(|trace| trace.original_index)
        .collect()
}

#[test]
fn undated_photos_trail_in_arrival_order() {
    let photos = vec![
        photo(0),
        photo(1),
        photo_at(2, "2024-01-05 10:00"),
        photo_at(3, "2024-01-03 10:00"),
    ];
    let timeline = Timeline::build(&resolver(), photos, &[], None);

    assert_eq!(order(&timeline), vec![3, 2, 0, 1]);
    assert_eq!(
        timeline.date_sequence,
        vec!["2024-01-03", "2024-01-05", "", ""]
    );
    assert_eq!(
        timeline.day_breaks,
        vec![DayBreak {
            position: 2,
            day_delta: 2
        }]
    );
    let positions: Vec<usize> = timeline.photos.iter().map(|photo| photo.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);
}

#[test]
fn sources_are_applied_in_priority_order() {
    let photos = vec![
        photo_at(0, "2024-02-01 09:00").with_file_name("IMG_20240301_090000.jpg"),
        photo_named(1, "IMG_20240301_090000.jpg"),
        photo_named(2, "IMG_20240301_090000.jpg"),
    ];
    let companions = vec![
        companion(&[("time", "2024-04-01 09:00")]),
        companion(&[("time", "2024-01-15 09:00")]),
    ];
    let timeline = Timeline::build(&resolver(), photos, &companions, None);

    assert_eq!(order(&timeline), vec![1, 0, 2]);
    let sources: Vec<Option<TimestampSource>> =
        timeline.ordering.iter().map(|trace| trace.source).collect();
    assert_eq!(
        sources,
        vec![
            Some(TimestampSource::CompanionSummary),
            Some(TimestampSource::PreExtracted),
            Some(TimestampSource::FilenamePattern),
        ]
    );
    assert_eq!(
        timeline.date_sequence,
        vec!["2024-01-15", "2024-02-01", "2024-03-01"]
    );
}

#[test]
fn unparseable_metadata_falls_through_to_file_name() {
    let photos = vec![photo_at(0, "not a date").with_file_name("IMG_20240105_101500.jpg")];
    let timeline = Timeline::build(&resolver(), photos, &[], None);

    assert_eq!(timeline.ordering[0].source, Some(TimestampSource::FilenamePattern));
    assert_eq!(timeline.ordering[0].parsed, "2024-01-05T10:15:00+00:00");
}

#[test]
fn target_date_shift_keeps_relative_days() {
    let photos = vec![
        photo_at(0, "2024-05-03 09:00"),
        photo_at(1, "2024-05-01 22:00"),
        photo(2),
    ];
    let target = NaiveDate::from_ymd_opt(2025, 1, 10).expect("date");
    let timeline = Timeline::build(&resolver(), photos, &[], Some(target));

    assert_eq!(order(&timeline), vec![1, 0, 2]);
    assert_eq!(
        timeline.date_sequence,
        vec!["2025-01-10", "2025-01-12", ""]
    );
    assert_eq!(
        timeline.day_breaks,
        vec![DayBreak {
            position: 2,
            day_delta: 2
        }]
    );
}

#[test]
fn calendar_dates_follow_the_reference_offset() {
    // 2024-01-01T15:30:00Z is already the next day at +09:00.
    let photos = vec![
        photo_at(0, 1_704_123_000_000_i64),
        photo_at(1, "2024-01-01 23:00"),
    ];
    let seoul = TimestampResolver::from_config(&TimelineConfig {
        utc_offset_minutes: 9 * 60,
    })
    .expect("resolver");
    let timeline = Timeline::build(&seoul, photos, &[], None);

    assert_eq!(order(&timeline), vec![1, 0]);
    assert_eq!(timeline.date_sequence, vec!["2024-01-01", "2024-01-02"]);
    assert_eq!(
        timeline.day_breaks,
        vec![DayBreak {
            position: 2,
            day_delta: 1
        }]
    );
}

#[test]
fn same_day_batches_have_no_breaks() {
    let photos = vec![
        photo_at(0, "2024-06-01 18:00"),
        photo_at(1, "2024-06-01 08:00"),
        photo_at(2, "2024-06-01 12:30"),
    ];
    let timeline = Timeline::build(&resolver(), photos, &[], None);

    assert_eq!(order(&timeline), vec![1, 2, 0]);
    assert!(timeline.day_breaks.is_empty());
    assert_eq!(timeline.len(), 3);
}

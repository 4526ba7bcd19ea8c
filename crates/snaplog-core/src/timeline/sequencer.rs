//! Chronological ordering of a resolved batch.

use chrono::{Duration, NaiveDate};
use log::info;
use snaplog_protocol::{OrderingTrace, PhotoInput, ResolvedTimestamp, SequencedPhoto};

/// Stable-sort photos by `(undated, instant, original_index)` and assign dense
/// 1-based positions.
///
/// Undated photos keep their arrival order at the tail.
pub fn sequence(
    photos: Vec<PhotoInput>,
    resolved: Vec<Option<ResolvedTimestamp>>,
) -> Vec<SequencedPhoto> {
    let mut paired: Vec<_> = photos.into_iter().zip(resolved).collect();
    paired.sort_by(|(left_photo, left), (right_photo, right)| {
        let left_key = (left.is_none(), left.map(|value| value.instant));
        let right_key = (right.is_none(), right.map(|value| value.instant));
        left_key
            .cmp(&right_key)
            .then(left_photo.original_index.cmp(&right_photo.original_index))
    });
    paired
        .into_iter()
        .enumerate()
        .map(|(idx, (photo, resolved))| SequencedPhoto {
            resolved_date: resolved
                .map(|value| value.calendar_date().format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            photo,
            resolved,
            position: idx + 1,
        })
        .collect()
}

/// Move every resolved instant by the whole-day offset between `target` and
/// the earliest resolved calendar date. Relative day deltas are preserved.
pub fn shift_to_target_date(resolved: &mut [Option<ResolvedTimestamp>], target: NaiveDate) {
    let Some(first) = resolved
        .iter()
        .flatten()
        .min_by_key(|value| value.instant)
        .map(ResolvedTimestamp::calendar_date)
    else {
        return;
    };
    let days = target.signed_duration_since(first).num_days();
    if days == 0 {
        return;
    }
    info!("shifting timeline (from={first}, to={target}, days={days})");
    for value in resolved.iter_mut().flatten() {
        if let Some(shifted) = value.instant.checked_add_signed(Duration::days(days)) {
            value.instant = shifted;
        }
    }
}

/// Resolved `YYYY-MM-DD` per position, empty when undated.
pub fn date_sequence(photos: &[SequencedPhoto]) -> Vec<String> {
    photos
        .iter()
        .map(|photo| photo.resolved_date.clone())
        .collect()
}

/// How each photo's position was decided.
pub fn ordering_trace(photos: &[SequencedPhoto]) -> Vec<OrderingTrace> {
    photos
        .iter()
        .map(|photo| OrderingTrace {
            original_index: photo.photo.original_index,
            position: photo.position,
            source: photo.resolved.map(|value| value.source),
            parsed: photo
                .resolved
                .map(|value| value.instant.to_rfc3339())
                .unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;
    use snaplog_protocol::{PhotoData, TimestampSource};

    fn at(seconds: i64) -> Option<ResolvedTimestamp> {
        let offset = FixedOffset::east_opt(0).expect("offset");
        let instant: DateTime<FixedOffset> = offset.timestamp_opt(seconds, 0).single()?;
        Some(ResolvedTimestamp {
            instant,
            source: TimestampSource::PreExtracted,
        })
    }

    fn photos(count: usize) -> Vec<PhotoInput> {
        (0..count)
            .map(|idx| PhotoInput::new(idx, PhotoData::Url(format!("u{idx}"))))
            .collect()
    }

    fn order(sequenced: &[SequencedPhoto]) -> Vec<usize> {
        sequenced
            .iter()
            .map(|photo| photo.photo.original_index)
            .collect()
    }

    #[test]
    fn undated_photos_trail_in_arrival_order() {
        let sequenced = sequence(photos(4), vec![None, None, at(5), at(3)]);
        assert_eq!(order(&sequenced), vec![3, 2, 0, 1]);
        let positions: Vec<_> = sequenced.iter().map(|photo| photo.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(sequenced[2].resolved_date, "");
    }

    #[test]
    fn equal_instants_keep_arrival_order() {
        let sequenced = sequence(photos(3), vec![at(10), at(10), at(1)]);
        assert_eq!(order(&sequenced), vec![2, 0, 1]);
    }

    #[test]
    fn target_date_shift_preserves_day_deltas() {
        let day = 86_400;
        let mut resolved = vec![at(1_704_067_200 + 3 * day), None, at(1_704_067_200)];
        let target = NaiveDate::from_ymd_opt(2024, 5, 10).expect("date");
        shift_to_target_date(&mut resolved, target);

        let sequenced = sequence(photos(3), resolved);
        assert_eq!(
            date_sequence(&sequenced),
            vec![
                "2024-05-10".to_string(),
                "2024-05-13".to_string(),
                String::new()
            ]
        );
    }

    #[test]
    fn ordering_trace_reports_source_and_instant() {
        let sequenced = sequence(photos(2), vec![None, at(0)]);
        let trace = ordering_trace(&sequenced);
        assert_eq!(trace[0].original_index, 1);
        assert_eq!(trace[0].source, Some(TimestampSource::PreExtracted));
        assert_eq!(trace[0].parsed, "1970-01-01T00:00:00+00:00");
        assert_eq!(trace[1].source, None);
        assert_eq!(trace[1].parsed, "");
    }
}

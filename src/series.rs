/// Series normalization and overlay projection.
///
/// The reporting API may deliver rows out of order and may repeat a
/// timestamp when a reading is corrected upstream; the correction always
/// appears later in the response. Normalization therefore keeps the
/// last occurrence per timestamp in input order, then sorts ascending,
/// yielding a strictly increasing timeline.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;

use crate::model::SeriesPoint;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Deduplicates and sorts a fetched series.
///
/// Duplicate timestamps are resolved by keeping the last occurrence in
/// input order, not the maximum value. Points with a missing `secondary`
/// value are retained as-is; whether to skip or interpolate them is the
/// renderer's decision.
pub fn normalize(points: Vec<SeriesPoint>) -> Vec<SeriesPoint> {
    let mut latest_by_time: HashMap<_, SeriesPoint> = HashMap::with_capacity(points.len());
    for point in points {
        latest_by_time.insert(point.timestamp, point);
    }

    let mut ordered: Vec<SeriesPoint> = latest_by_time.into_values().collect();
    ordered.sort_by_key(|p| p.timestamp);
    ordered
}

// ---------------------------------------------------------------------------
// Overlay projection
// ---------------------------------------------------------------------------

/// Anchor date for the 24-hour overlay axis. Every point is re-projected
/// onto this date so days can be compared hour against hour.
const OVERLAY_ANCHOR: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(date) => date,
    None => unreachable!(),
};

/// One calendar day's worth of re-projected points.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    /// `YYYY-MM-DD` label of the source day, used in the chart legend.
    pub label: String,
    /// Points projected onto the anchor date, sorted by time of day.
    pub points: Vec<(NaiveDateTime, f64)>,
}

/// Re-projects a normalized series onto a shared 24-hour axis, one bucket
/// per calendar day present in the data. `value` selects which series of
/// the point to project; points where it yields `None` are skipped.
///
/// Buckets are returned sorted by day label so chart color assignment is
/// deterministic for identical input.
pub fn overlay_by_day<F>(points: &[SeriesPoint], value: F) -> Vec<DayBucket>
where
    F: Fn(&SeriesPoint) -> Option<f64>,
{
    let mut by_day: HashMap<String, Vec<(NaiveDateTime, f64)>> = HashMap::new();
    for point in points {
        let Some(v) = value(point) else { continue };
        let naive = point.timestamp.naive_utc();
        let label = naive.date().format("%Y-%m-%d").to_string();
        let projected = NaiveDateTime::new(OVERLAY_ANCHOR, naive.time());
        by_day.entry(label).or_default().push((projected, v));
    }

    let mut buckets: Vec<DayBucket> = by_day
        .into_iter()
        .map(|(label, mut points)| {
            points.sort_by_key(|(t, _)| *t);
            DayBucket { label, points }
        })
        .collect();
    buckets.sort_by(|a, b| a.label.cmp(&b.label));
    buckets
}

/// Start of the overlay axis (midnight on the anchor date).
pub fn overlay_axis_start() -> NaiveDateTime {
    NaiveDateTime::new(OVERLAY_ANCHOR, NaiveTime::MIN)
}

/// End of the overlay axis (midnight on the day after the anchor date).
pub fn overlay_axis_end() -> NaiveDateTime {
    NaiveDateTime::new(
        OVERLAY_ANCHOR.succ_opt().expect("anchor date has a successor"),
        NaiveTime::MIN,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Frame selection: keeping the recent frames of a batch and deriving how
//! long ago each one was taken.

use chrono::NaiveDateTime;

use crate::model::RadarFrame;
use crate::timeutil::parse_timestamp_token;

/// Keep frames taken within `window_minutes` of the newest frame, newest
/// first.
///
/// Frames whose timestamp token does not parse are dropped. If no frame in
/// the batch parses, the input is returned unchanged (original order), since
/// there is nothing to measure the window against.
///
/// Filtering the output again with the same window returns it unchanged.
pub fn filter_recent_frames(frames: &[RadarFrame], window_minutes: i64) -> Vec<RadarFrame> {
    let parsed: Vec<(NaiveDateTime, &RadarFrame)> = frames
        .iter()
        .filter_map(|f| parse_timestamp_token(&f.timestamp_token).map(|ts| (ts, f)))
        .collect();

    let Some(newest) = parsed.iter().map(|(ts, _)| *ts).max() else {
        return frames.to_vec();
    };

    let window_seconds = window_minutes.saturating_mul(60);
    let mut recent: Vec<(NaiveDateTime, &RadarFrame)> = parsed
        .into_iter()
        .filter(|(ts, _)| {
            let age = (newest - *ts).num_seconds();
            (0..=window_seconds).contains(&age)
        })
        .collect();

    // Stable, so frames sharing a timestamp keep their relative order.
    recent.sort_by(|a, b| b.0.cmp(&a.0));
    recent.into_iter().map(|(_, f)| f.clone()).collect()
}

/// Minutes between the first frame and each frame of a newest-first batch.
///
/// The first element is always 0. A frame whose token (or the first
/// frame's token) does not parse falls back to its position times the
/// nominal poll interval. Values never go negative.
pub fn minutes_series(frames: &[RadarFrame], poll_interval_minutes: u32) -> Vec<f64> {
    let newest = frames
        .first()
        .and_then(|f| parse_timestamp_token(&f.timestamp_token));

    frames
        .iter()
        .enumerate()
        .map(|(position, frame)| {
            if position == 0 {
                return 0.0;
            }
            let measured = newest.zip(parse_timestamp_token(&frame.timestamp_token));
            match measured {
                Some((newest, ts)) => ((newest - ts).num_seconds() as f64 / 60.0).max(0.0),
                None => position as f64 * f64::from(poll_interval_minutes),
            }
        })
        .collect()
}

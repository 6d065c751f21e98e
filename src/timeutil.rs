//! Time helpers: radar slot tokens, local-time conversion and quiet hours.
//!
//! Radar slots are named in the radar operator's local time (Singapore,
//! UTC+08:00 by default), so every conversion goes through a fixed offset
//! rather than a named zone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

/// Singapore's offset from UTC in minutes.
pub const SINGAPORE_OFFSET_MINUTES: i32 = 8 * 60;

/// Errors from parsing time-of-day strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("invalid HH:MM value: {0}")]
    InvalidTimeOfDay(String),

    #[error("invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
}

/// Build a fixed offset from minutes east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, TimeError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(TimeError::InvalidOffset(minutes))
}

/// Convert a UTC instant to the given local offset.
pub fn to_local(dt: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    dt.with_timezone(&offset)
}

/// Round `dt` down to the previous multiple of `step_minutes`, dropping
/// seconds and sub-second precision.
pub fn floor_minutes(dt: DateTime<FixedOffset>, step_minutes: u32) -> DateTime<FixedOffset> {
    let step = step_minutes.max(1);
    let minute = (dt.minute() / step) * step;
    dt.with_minute(minute)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Format a radar slot token (`YYYYMMDDHHMM`).
pub fn timestamp_token(dt: DateTime<FixedOffset>) -> String {
    dt.format("%Y%m%d%H%M").to_string()
}

/// Parse a radar slot token back into a naive local timestamp.
///
/// Returns `None` for anything that is not exactly twelve ASCII digits
/// describing a real calendar minute.
pub fn parse_timestamp_token(token: &str) -> Option<NaiveDateTime> {
    if token.len() != 12 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| token[range].parse::<u32>().ok();
    let year = token[0..4].parse::<i32>().ok()?;
    let month = field(4..6)?;
    let day = field(6..8)?;
    let hour = field(8..10)?;
    let minute = field(10..12)?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Minutes elapsed from `older` to `newer`; `f64::INFINITY` when there is
/// no `older` instant.
pub fn minutes_between(older: Option<DateTime<FixedOffset>>, newer: DateTime<FixedOffset>) -> f64 {
    match older {
        Some(older) => (newer - older).num_milliseconds() as f64 / 60_000.0,
        None => f64::INFINITY,
    }
}

/// Parse an RFC 3339 timestamp, treating offset-less values as UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(Utc.from_utc_datetime(&naive).fixed_offset())
}

/// A daily local-time window during which only high-level alerts may notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start_minutes: u32,
    end_minutes: u32,
}

impl QuietHours {
    /// Parse a pair of `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        Ok(Self {
            start_minutes: parse_hhmm(start)?,
            end_minutes: parse_hhmm(end)?,
        })
    }

    /// Whether `now` falls inside the window.
    ///
    /// The window is half open (`start <= now < end`) and wraps midnight
    /// when `start > end`. Equal start and end disable quiet hours.
    pub fn contains(&self, now: DateTime<FixedOffset>) -> bool {
        let now_minutes = now.hour() * 60 + now.minute();
        let (start, end) = (self.start_minutes, self.end_minutes);

        if start == end {
            return false;
        }
        if start < end {
            return start <= now_minutes && now_minutes < end;
        }
        now_minutes >= start || now_minutes < end
    }
}

fn parse_hhmm(value: &str) -> Result<u32, TimeError> {
    let invalid = || TimeError::InvalidTimeOfDay(value.to_string());

    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sgt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        offset_from_minutes(SINGAPORE_OFFSET_MINUTES)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_floor_and_token() {
        let now_utc = Utc.with_ymd_and_hms(2026, 2, 16, 7, 3, 31).unwrap();
        let local = to_local(now_utc, offset_from_minutes(SINGAPORE_OFFSET_MINUTES).unwrap());
        let rounded = floor_minutes(local, 5);
        assert_eq!(timestamp_token(rounded), "202602161500");
        assert_eq!(rounded.second(), 0);
    }

    #[test]
    fn test_parse_timestamp_token() {
        let parsed = parse_timestamp_token("202602161455").unwrap();
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 55);

        assert!(parse_timestamp_token("20260216145").is_none());
        assert!(parse_timestamp_token("2026021614a5").is_none());
        assert!(parse_timestamp_token("202602301455").is_none());
        assert!(parse_timestamp_token("202602162460").is_none());
    }

    #[test]
    fn test_offset_from_minutes_rejects_out_of_range() {
        assert_eq!(offset_from_minutes(480).unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(offset_from_minutes(-24 * 60), Err(TimeError::InvalidOffset(-24 * 60)));
        assert_eq!(offset_from_minutes(100_000_000), Err(TimeError::InvalidOffset(100_000_000)));
        assert_eq!(offset_from_minutes(i32::MIN), Err(TimeError::InvalidOffset(i32::MIN)));
    }

    #[test]
    fn test_minutes_between() {
        let older = sgt(2026, 2, 16, 13, 45);
        let newer = sgt(2026, 2, 16, 14, 0);
        assert_eq!(minutes_between(Some(older), newer), 15.0);
        assert!(minutes_between(None, newer).is_infinite());
    }

    #[test]
    fn test_parse_instant_accepts_offsets_and_naive() {
        let with_offset = parse_instant("2026-02-16T13:45:00+08:00").unwrap();
        assert_eq!(with_offset.hour(), 13);

        let naive = parse_instant("2026-02-16T05:45:00").unwrap();
        assert_eq!(naive.offset().local_minus_utc(), 0);

        assert!(parse_instant("yesterday").is_none());
    }

    #[test]
    fn test_quiet_hours_wrapping_midnight() {
        let quiet = QuietHours::parse("23:00", "07:00").unwrap();
        assert!(quiet.contains(sgt(2026, 2, 16, 23, 30)));
        assert!(quiet.contains(sgt(2026, 2, 16, 0, 15)));
        assert!(quiet.contains(sgt(2026, 2, 16, 6, 59)));
        assert!(!quiet.contains(sgt(2026, 2, 16, 7, 0)));
        assert!(!quiet.contains(sgt(2026, 2, 16, 14, 0)));
    }

    #[test]
    fn test_quiet_hours_same_day_and_disabled() {
        let quiet = QuietHours::parse("12:00", "13:30").unwrap();
        assert!(quiet.contains(sgt(2026, 2, 16, 12, 0)));
        assert!(!quiet.contains(sgt(2026, 2, 16, 13, 30)));

        let disabled = QuietHours::parse("08:00", "08:00").unwrap();
        assert!(!disabled.contains(sgt(2026, 2, 16, 8, 0)));
    }

    #[test]
    fn test_quiet_hours_rejects_garbage() {
        assert!(QuietHours::parse("24:00", "07:00").is_err());
        assert!(QuietHours::parse("23", "07:00").is_err());
        assert!(QuietHours::parse("23:00", "7:60").is_err());
    }
}

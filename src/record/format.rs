//! Display helpers for record times (epoch 2000-01-01 00:00:00 UTC)

use chrono::{Duration, NaiveDate, NaiveDateTime};

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// "Hh MMm", e.g. `fmt_duration(5400) == "1h 30m"`.
pub fn fmt_duration(seconds: u32) -> String {
    format!("{}h {:02}m", seconds / 3600, (seconds % 3600) / 60)
}

/// "YYYY-MM-DD" for a day count since the epoch.
pub fn fmt_days(days: u16) -> String {
    (epoch() + Duration::days(i64::from(days)))
        .format("%Y-%m-%d")
        .to_string()
}

/// "YYYY-MM-DD HH:00" for an hour-aligned session timestamp.
pub fn fmt_timestamp(timestamp: u32) -> String {
    (epoch() + Duration::seconds(i64::from(timestamp)))
        .format("%Y-%m-%d %H:00")
        .to_string()
}

/// Seconds since the epoch, truncated to the hour.
pub fn hour_timestamp(at: NaiveDateTime) -> u32 {
    let secs = (at - epoch()).num_seconds().clamp(0, i64::from(u32::MAX));
    (secs as u32) / 3600 * 3600
}

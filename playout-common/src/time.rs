//! Timestamp and duration utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Convert duration to whole milliseconds, saturating at u64::MAX
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Format a duration as `H:MM:SS.mmm` for log output
pub fn format_timecode(duration: Duration) -> String {
    let total_ms = duration_to_millis(duration);
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

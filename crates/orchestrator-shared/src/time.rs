//! Small time-formatting helpers shared by components that surface
//! durations to a human (the Question Handler's timeout notice, task
//! `created_at` bookkeeping).

use chrono::Duration;

/// Renders `seconds` as a short human-readable duration ("10 minutes",
/// "90 seconds", "1 hour"), singular when the count is exactly one.
pub fn humanize_seconds(seconds: u64) -> String {
    let duration = Duration::seconds(seconds as i64);

    let hours = duration.num_hours();
    if hours >= 1 && duration.num_minutes() % 60 == 0 {
        return pluralize(hours, "hour");
    }

    let minutes = duration.num_minutes();
    if minutes >= 1 {
        return pluralize(minutes, "minute");
    }

    pluralize(duration.num_seconds(), "second")
}

fn pluralize(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

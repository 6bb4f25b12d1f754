//! Process uptime probe.

use std::time::Duration;

/// Renders elapsed time since the probe set was created.
#[must_use]
pub fn report(elapsed: Duration) -> String {
    format!("Uptime: {}", humanize(elapsed))
}

/// Humanizes a duration with second resolution: `1d 2h 3m 4s`.
///
/// Zero-valued leading components are skipped; a sub-second duration renders
/// as `0s`.
#[must_use]
pub fn humanize(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return "0s".to_string();
    }

    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

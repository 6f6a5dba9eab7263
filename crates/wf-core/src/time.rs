//! Time helpers shared by the pipeline and the CLI

use crate::error::{CoreError, CoreResult};

/// Format seconds as `m:ss.mmm` (or `h:mm:ss.mmm` above one hour)
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
    } else {
        format!("{}:{:02}.{:03}", mins, secs, ms)
    }
}

/// Parse a `START:END` range in seconds, e.g. `1.5:20`
pub fn parse_time_range(value: &str) -> CoreResult<(f64, f64)> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| CoreError::InvalidTimeRange(format!("expected START:END, got '{}'", value)))?;

    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| CoreError::InvalidTimeRange(format!("not a number: '{}'", part)))
    };

    Ok((parse(start)?, parse(end)?))
}

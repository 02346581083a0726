//! Formatting utilities for display values.

use std::time::Duration;

/// Percentage with one decimal place, e.g. `0.4567 -> 45.7`.
pub fn ratio_to_percent(ratio: f64) -> f64 {
    (ratio * 1000.0).round() / 10.0
}

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let secs = duration.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

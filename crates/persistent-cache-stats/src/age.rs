//! Human-readable ages

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Render an age in whole units of the largest unit that counts more than one,
/// falling back to seconds: `3d`, `36h`, `90s`.
pub fn format_age(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };

    for (unit, suffix) in [(DAY, "d"), (HOUR, "h"), (MINUTE, "m")] {
        let value = secs / unit;
        if value > 1 {
            return format!("{}{}", value, suffix);
        }
    }
    format!("{}s", secs)
}

/// Like [`format_age`], or `-` when there is nothing to measure
pub fn format_optional_age(secs: Option<f64>) -> String {
    secs.map(format_age).unwrap_or_else(|| "-".to_string())
}

//! Human-friendly duration values (`300`, `300s`, `500ms`, `5m`, `1h`).

use std::time::Duration;

/// Parse a duration. A bare integer is read as seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3_600).map(Duration::from_secs),
        _ => None,
    }
}

/// Render a duration in the shortest unit that is exact.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() != 0 || (duration.as_secs() == 0 && !duration.is_zero()) {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

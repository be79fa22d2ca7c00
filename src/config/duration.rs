//! Human-readable hook deadlines ("500ms", "30s", "2m", "1h").

use std::time::Duration;

/// Parse a duration string into a [`Duration`].
///
/// The string is a non-negative integer followed by an optional unit:
/// `ms`, `s`, `m` or `h`. A bare number is taken as seconds. Surrounding
/// whitespace and whitespace between number and unit are ignored.
///
/// Returns `None` if the string cannot be parsed or overflows.
///
/// # Examples
///
/// ```
/// use service_lifecycle::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_duration_string("30"), Some(Duration::from_secs(30)));
/// assert_eq!(parse_duration_string("soon"), None);
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

/// Render a duration in the shortest unit [`parse_duration_string`] reads back exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

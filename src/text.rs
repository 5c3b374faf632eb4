//! Display helpers for flow names, durations and dates.

use chrono::{DateTime, NaiveDateTime};

/// Converts `snake_case` to sentence case for display.
///
/// `"create_email_draft"` becomes `"Create email draft"`.
pub fn to_normal_case(snake_case: &str) -> String {
    snake_case
        .split('_')
        .enumerate()
        .map(|(index, word)| {
            let lower = word.to_lowercase();
            if index > 0 {
                return lower;
            }
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable execution duration: `"850ms"`, `"2.5s"`, or `"N/A"`.
pub fn format_duration(millis: Option<f64>) -> String {
    match millis {
        Some(ms) if ms > 0.0 && ms < 1000.0 => format!("{ms}ms"),
        Some(ms) if ms >= 1000.0 => format!("{:.1}s", ms / 1000.0),
        _ => "N/A".to_string(),
    }
}

/// Calendar date for a backend timestamp, `"Recently"` when absent or unparsable.
///
/// The flow backend emits both RFC 3339 and naive ISO timestamps.
pub fn format_date_label(timestamp: Option<&str>) -> String {
    let Some(raw) = timestamp else {
        return "Recently".to_string();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d").to_string();
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map_or_else(
        |_| "Recently".to_string(),
        |dt| dt.format("%Y-%m-%d").to_string(),
    )
}

//! Small formatters shared by tables and detail views.

use chrono::{DateTime, Utc};

/// File size with a binary unit: `512 B`, `1.5 KB`, `3.2 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Cut `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let kept: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", kept)
}

/// Age of a version for list views: `just now`, `5 mins ago`, `3h ago`,
/// `2d ago`, then the calendar date.
pub fn format_relative_time(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(timestamp);

    match (age.num_seconds(), age.num_minutes(), age.num_hours(), age.num_days()) {
        (s, _, _, _) if s < 0 => timestamp.format("%Y-%m-%d").to_string(),
        (_, 0, _, _) => "just now".to_string(),
        (_, m, 0, _) => format!("{} mins ago", m),
        (_, _, h, 0) => format!("{}h ago", h),
        (_, _, _, d) if d < 7 => format!("{}d ago", d),
        _ => timestamp.format("%Y-%m-%d").to_string(),
    }
}

/// `1 file`, `3 files`.
pub fn format_file_count(n: usize) -> String {
    if n == 1 {
        "1 file".to_string()
    } else {
        format!("{} files", n)
    }
}

/// Absolute timestamp for detail views.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("Intro", 10), "Intro");
        assert_eq!(truncate_label("Tighten the intro", 10), "Tighten...");
        assert_eq!(truncate_label("Ünïcödé label", 6), "Ünï...");
        assert_eq!(truncate_label("abcdef", 2), "..");
    }

    #[test]
    fn test_format_file_count() {
        assert_eq!(format_file_count(0), "0 files");
        assert_eq!(format_file_count(1), "1 file");
        assert_eq!(format_file_count(12), "12 files");
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(format_relative_time(now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5)), "5 mins ago");
        assert_eq!(format_relative_time(now - Duration::hours(3)), "3h ago");
        assert_eq!(format_relative_time(now - Duration::days(2)), "2d ago");
    }
}

// Formatting utilities for CLI output

use chrono::{DateTime, Utc};

/// Format a number with thousands separators
pub fn format_number(n: i64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 && chars[i - 1] != '-' {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Signed delta with separators (e.g., "+1,250", "-40")
pub fn format_delta(n: i64) -> String {
    if n > 0 {
        format!("+{}", format_number(n))
    } else {
        format_number(n)
    }
}

/// Format points with suffix (e.g., "1.2k", "3.5M")
pub fn format_points_short(points: i64) -> String {
    if points >= 1_000_000 {
        format!("{:.1}M", points as f64 / 1_000_000.0)
    } else if points >= 1_000 {
        format!("{:.1}k", points as f64 / 1_000.0)
    } else {
        points.to_string()
    }
}

/// Truncate string to max characters with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Ten-cell progress bar (e.g., "[####------] 40%")
pub fn progress_bar(percent: u8) -> String {
    let percent = percent.min(100);
    let filled = (percent / 10) as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(10 - filled),
        percent
    )
}

/// Format relative time (e.g., "2 hours ago")
pub fn format_relative_time(seconds_ago: i64) -> String {
    if seconds_ago < 60 {
        "just now".to_string()
    } else if seconds_ago < 3600 {
        let mins = seconds_ago / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if seconds_ago < 86400 {
        let hours = seconds_ago / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = seconds_ago / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}

/// Relative time of a timestamp from now
pub fn format_since(at: DateTime<Utc>) -> String {
    format_relative_time((Utc::now() - at).num_seconds().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1000000), "1,000,000");
        assert_eq!(format_number(123), "123");
        assert_eq!(format_number(-1000), "-1,000");
        assert_eq!(format_number(-100), "-100");
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(1250), "+1,250");
        assert_eq!(format_delta(-40), "-40");
        assert_eq!(format_delta(0), "0");
    }

    #[test]
    fn test_format_points_short() {
        assert_eq!(format_points_short(500), "500");
        assert_eq!(format_points_short(1500), "1.5k");
        assert_eq!(format_points_short(1500000), "1.5M");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("Prämie für Team", 7), "Prä...");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0), "[----------]   0%");
        assert_eq!(progress_bar(45), "[####------]  45%");
        assert_eq!(progress_bar(100), "[##########] 100%");
    }

    #[test]
    fn test_format_relative_time() {
        assert_eq!(format_relative_time(30), "just now");
        assert_eq!(format_relative_time(60), "1 minute ago");
        assert_eq!(format_relative_time(7200), "2 hours ago");
        assert_eq!(format_relative_time(86400 * 3), "3 days ago");
    }
}

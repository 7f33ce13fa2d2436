//! Human-readable formatting for sizes and timestamps.

use chrono::{DateTime, Utc};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Format a byte count, e.g. `"1.5 MB"`.
pub fn format_size(bytes: u64) -> String {
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

/// Format a timestamp as a short month/day, e.g. `"Jan 05"`.
pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%b %d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * MB / 2), "1.5 MB");
        assert_eq!(format_size(2 * GB), "2.0 GB");
    }

    #[test]
    fn test_format_time() {
        let t = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(format_time(Some(t)), "Jan 05");
        assert_eq!(format_time(None), "");
    }
}

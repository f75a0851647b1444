//! Human readable units for reports.

use std::time::Duration;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count using 1024-based units chosen by magnitude.
///
/// Plain bytes are printed as integers, larger units with two decimals.
///
/// # Examples
///
/// ```
/// use autocompress_common::units::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(100 * 1024 * 1024), "100.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}

/// Format a duration as `H:MM:SS`, dropping fractional seconds.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use autocompress_common::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(65_900)), "0:01:05");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Ratio of original to compressed size, rounded to two decimals.
///
/// Returns `None` when the compressed size is zero.
pub fn compression_ratio(original: u64, compressed: u64) -> Option<f64> {
    if compressed == 0 {
        return None;
    }
    let ratio = original as f64 / compressed as f64;
    Some((ratio * 100.0).round() / 100.0)
}

use chrono::{DateTime, Local, Utc};
use colored::*;

/// Format byte count in human-readable format (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{}B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else if size < 1024 * 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a megabyte figure, switching to GB above 1024 MB
pub fn format_mb(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.1}GB", mb / 1024.0)
    } else {
        format!("{:.1}MB", mb)
    }
}

/// Format a bytes-per-second rate
pub fn format_rate(bytes_per_sec: f64) -> String {
    format!("{}/s", format_size(bytes_per_sec.max(0.0) as u64))
}

/// Percentage colored by load: green below 50, yellow below 80, red above
pub fn format_percent(value: f64) -> ColoredString {
    let text = format!("{:.1}%", value);
    if value < 50.0 {
        text.green()
    } else if value < 80.0 {
        text.yellow()
    } else {
        text.red()
    }
}

/// Format timestamp in local time (YYYY-MM-DD HH:MM:SS)
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn print_section_header(title: &str) {
    println!("\n{}", title.bold().green());
    println!("{}", "-".repeat(title.len()));
}

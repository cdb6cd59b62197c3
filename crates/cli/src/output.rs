//! Output formatting utilities

use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a rounded table
pub fn render_table<T: tabled::Tabled>(rows: Vec<T>) -> String {
    tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string()
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format megabytes with two decimals
pub fn format_mb(mb: f64) -> String {
    format!("{:.2} MB", mb)
}

/// Format kilobytes as megabytes
pub fn format_kb(kb: u64) -> String {
    format_mb(kb as f64 / 1024.0)
}

pub fn format_ratio(ratio: f64) -> String {
    format!("{:.1}", ratio)
}

/// Format unix seconds as a UTC timestamp
pub fn format_timestamp(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}

/// Color a health bucket or component status
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "warning" | "degraded" => status.yellow().to_string(),
        "critical" | "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color an alert severity
pub fn color_severity(severity: &str) -> String {
    match severity.to_lowercase().as_str() {
        "critical" => severity.red().bold().to_string(),
        "warning" => severity.yellow().to_string(),
        "info" => severity.blue().to_string(),
        _ => severity.to_string(),
    }
}

/// Mark a leak-suspect flag
pub fn format_flag(flag: bool) -> String {
    if flag {
        "yes".red().to_string()
    } else {
        "no".to_string()
    }
}

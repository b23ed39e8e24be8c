//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a rounded table, or a notice when there are no rows
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a section heading
pub fn print_heading(title: &str, width: usize) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(width));
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

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}Gi", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Format a score in [0, 1] with three decimals, `-` when absent
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{:.3}", value),
        None => "-".to_string(),
    }
}

/// Format a share as percentage
pub fn format_percent(share: f64) -> String {
    format!("{:.0}%", share * 100.0)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a drift flag
pub fn color_drift(drift_detected: bool) -> String {
    if drift_detected {
        "drift".red().bold().to_string()
    } else {
        "stable".green().to_string()
    }
}

/// Color a label by obesity risk
pub fn color_label(label: &str) -> String {
    if label.starts_with("Obesity") {
        label.red().to_string()
    } else if label.starts_with("Overweight") {
        label.yellow().to_string()
    } else if label == "Normal_Weight" {
        label.green().to_string()
    } else {
        label.cyan().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00Ki");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00Mi");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(Some(0.26666)), "0.267");
        assert_eq!(format_score(None), "-");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.5), "50%");
    }

    #[test]
    fn test_colored_text_keeps_content() {
        colored::control::set_override(false);
        assert_eq!(color_drift(true), "drift");
        assert_eq!(color_label("Obesity_Type_I"), "Obesity_Type_I");
        assert_eq!(color_status("degraded"), "degraded");
    }
}

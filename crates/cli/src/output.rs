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

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

/// Print a rounded table, or a note when there is nothing to show
pub fn print_table<T: Tabled>(items: Vec<T>, empty_message: &str) {
    if items.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
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

/// Color a cardinality level
pub fn color_level(level: &str) -> String {
    match level {
        "fine" => level.green().to_string(),
        "careful" => level.yellow().to_string(),
        "avoid" | "unknown" => level.red().to_string(),
        _ => level.to_string(),
    }
}

/// Color a reload class
pub fn color_reload(reload: &str) -> String {
    match reload {
        "dynamic" => reload.cyan().to_string(),
        _ => reload.to_string(),
    }
}

/// Color a ready state
pub fn color_ready(ready: Option<bool>) -> String {
    match ready {
        Some(true) => "ready".green().to_string(),
        Some(false) => "failed".red().to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing_ignores_case() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::parse("yaml"), None);
    }

    #[test]
    fn test_colors_keep_text() {
        assert!(color_level("avoid").contains("avoid"));
        assert!(color_reload("static").contains("static"));
        assert!(color_ready(None).contains('-'));
    }
}

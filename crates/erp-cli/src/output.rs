//! Terminal output in text or JSON form.

use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a value as pretty JSON regardless of the selected format.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str, format: &OutputFormat) {
    println!("{}", status_line("success", message, format));
}

/// Errors go to stderr so JSON on stdout stays parseable.
pub fn print_error(message: &str, format: &OutputFormat) {
    eprintln!("{}", status_line("error", message, format));
}

fn status_line(status: &str, message: &str, format: &OutputFormat) -> String {
    match (format, status) {
        (OutputFormat::Text, "error") => format!("Error: {}", message),
        (OutputFormat::Text, _) => message.to_string(),
        (OutputFormat::Json, _) => json!({"status": status, "message": message}).to_string(),
    }
}

pub fn print_row(label: &str, value: &str) {
    println!("{}", row(label, value));
}

fn row(label: &str, value: &str) -> String {
    format!("  {:<10} {}", format!("{}:", label), value)
}

pub fn print_heading(text: &str) {
    println!("\n{}\n{}", text, "-".repeat(text.chars().count().max(40)));
}

//! Output formatting for CLI commands.
//!
//! Everything printed here has already been redacted: bundles carry
//! `SecretString` fields and presence checks carry an eight character
//! preview at most.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::secrets::SecretPresence;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

/// Print data as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    println!("{}", render_json(data)?);
    Ok(())
}

pub fn render_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data).context("Failed to serialize to JSON")
}

/// Presence rows in the requested format.
pub fn print_presence(rows: &[SecretPresence], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            print_table_header(&[("KEY", 40), ("EXISTS", 7), ("PREVIEW", 10)]);
            for row in rows {
                println!(
                    "{:<40} {:<7} {}",
                    truncate(&row.key, 40),
                    if row.exists { "yes" } else { "no" },
                    row.preview.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Print a horizontal separator line
pub fn print_separator(width: usize) {
    println!("{}", "-".repeat(width));
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    print_separator(total_width.saturating_sub(1));
}

//! Output formatting for CLI commands

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use crate::domain::CredentialSummary;
use crate::storage::MigrationInfo;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

/// Print data as JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a table header followed by a separator
pub fn print_table_header(columns: &[(&str, usize)]) {
    println!();
    let mut header = String::new();
    for (name, width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = width));
    }
    println!("{}", header.trim());

    let total_width: usize = columns.iter().map(|(_, w)| w + 1).sum();
    println!("{}", "-".repeat(total_width.saturating_sub(1)));
}

pub fn print_credentials(credentials: &[CredentialSummary], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(&credentials),
        OutputFormat::Table => {
            if credentials.is_empty() {
                println!("No credentials stored");
                return Ok(());
            }
            print_table_header(&[("Service", 12), ("Fingerprint", 12), ("Created", 20), ("Last used", 20)]);
            for credential in credentials {
                println!(
                    "{:<12} {:<12} {:<20} {:<20}",
                    credential.service,
                    credential.fingerprint,
                    credential.created_at.format("%Y-%m-%d %H:%M:%S"),
                    credential
                        .last_used_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
            Ok(())
        }
    }
}

pub fn print_migrations(migrations: &[MigrationInfo]) {
    print_table_header(&[("Version", 15), ("Description", 40), ("Applied On", 20), ("Time (ms)", 10)]);
    for migration in migrations {
        println!(
            "{:<15} {:<40} {:<20} {:<10}",
            migration.version,
            truncate(&migration.description, 38),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.execution_time
        );
    }
}

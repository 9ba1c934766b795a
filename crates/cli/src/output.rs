//! Output formatting utilities

use aiops_lib::{AlertStatus, ExecutionStatus, IncidentPriority, IncidentStatus, Severity};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print `data` as JSON, or `rows` as a table with `label` totals
pub fn print_list<T: Serialize, R: Tabled>(
    data: &[T],
    rows: impl FnOnce(&[T]) -> Vec<R>,
    label: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&data)?,
        OutputFormat::Table => {
            if data.is_empty() {
                print_warning(&format!("No {label} found"));
                return Ok(());
            }
            let table = Table::new(rows(data)).with(Style::rounded()).to_string();
            println!("{}", table);
            println!("\nTotal: {} {}", data.len(), label);
        }
    }
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// First segment of a UUID, enough to tell rows apart
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn color_severity(severity: Severity) -> String {
    let label = severity.as_str();
    match severity {
        Severity::Critical => label.red().bold().to_string(),
        Severity::High => label.red().to_string(),
        Severity::Medium => label.yellow().to_string(),
        Severity::Low => label.to_string(),
    }
}

pub fn color_alert_status(status: AlertStatus) -> String {
    let label = status.as_str();
    match status {
        AlertStatus::Open => label.red().to_string(),
        AlertStatus::Acknowledged => label.yellow().to_string(),
        AlertStatus::Resolved | AlertStatus::Closed => label.green().to_string(),
    }
}

pub fn color_priority(priority: IncidentPriority) -> String {
    let label = priority.as_str();
    match priority {
        IncidentPriority::Urgent => label.red().bold().to_string(),
        IncidentPriority::High => label.red().to_string(),
        IncidentPriority::Medium => label.yellow().to_string(),
        IncidentPriority::Low => label.to_string(),
    }
}

pub fn color_incident_status(status: IncidentStatus) -> String {
    if status.is_open() {
        status.as_str().yellow().to_string()
    } else {
        status.as_str().to_string()
    }
}

pub fn color_execution(status: ExecutionStatus) -> String {
    let label = status.as_str();
    match status {
        ExecutionStatus::Success => label.green().to_string(),
        ExecutionStatus::Failed => label.red().to_string(),
        _ => label.yellow().to_string(),
    }
}

pub fn color_grade(grade: char) -> String {
    let label = grade.to_string();
    match grade {
        'A' | 'B' => label.green().bold().to_string(),
        'C' => label.yellow().bold().to_string(),
        _ => label.red().bold().to_string(),
    }
}

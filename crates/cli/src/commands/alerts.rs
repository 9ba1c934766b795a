//! Alert-related CLI commands

use aiops_lib::{
    analytics::PerformanceAnalyzer, store::AlertFilter, Alert, AlertManager, AlertStatus,
};
use anyhow::{Context, Result};
use tabled::Tabled;
use uuid::Uuid;

use crate::output::{
    color_alert_status, color_severity, format_time, print_json, print_list, print_success,
    OutputFormat,
};
use crate::session::Session;

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Host")]
    hostname: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// List open alerts, or every alert with `all`
pub async fn list(session: &Session, all: bool, format: OutputFormat) -> Result<()> {
    let filter = if all {
        AlertFilter::default()
    } else {
        AlertFilter::open()
    };
    let alerts = session.store.list_alerts(&filter).await?;

    print_list(
        &alerts,
        |alerts| alerts.iter().map(alert_row).collect(),
        "alerts",
        format,
    )
}

fn alert_row(alert: &Alert) -> AlertRow {
    let value = if alert.is_statistical() {
        format!("{:.2} (anomaly)", alert.current_value)
    } else {
        format!("{:.2} > {:.2}", alert.current_value, alert.threshold_value)
    };
    AlertRow {
        id: alert.id.to_string(),
        hostname: alert.hostname.clone(),
        title: alert.title.clone(),
        severity: color_severity(alert.severity),
        status: color_alert_status(alert.status),
        value,
        created_at: format_time(alert.created_at),
    }
}

/// Move an alert one step along its lifecycle
pub async fn transition(
    session: &Session,
    id: &str,
    to: AlertStatus,
    format: OutputFormat,
) -> Result<()> {
    let id: Uuid = id
        .parse()
        .with_context(|| format!("'{id}' is not a valid alert id"))?;
    let manager = AlertManager::new(session.store.clone());
    let alert = manager
        .transition(id, to)
        .await
        .with_context(|| format!("failed to mark alert {id} as {to}"))?;
    session.persist().await?;

    match format {
        OutputFormat::Json => print_json(&alert)?,
        OutputFormat::Table => {
            print_success(&format!("Alert {} is now {}", alert.id, alert.status))
        }
    }
    Ok(())
}

/// Alert breakdown over the last `days`
pub async fn stats(session: &Session, days: i64, format: OutputFormat) -> Result<()> {
    let stats = PerformanceAnalyzer::new(session.store.clone())
        .alert_statistics(days)
        .await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            let mut rows = Vec::new();
            rows.extend(stats.by_severity.iter().map(|(k, v)| CountRow {
                group: "severity".to_string(),
                key: k.to_string(),
                count: *v,
            }));
            rows.extend(stats.by_status.iter().map(|(k, v)| CountRow {
                group: "status".to_string(),
                key: k.to_string(),
                count: *v,
            }));
            rows.extend(stats.by_metric_kind.iter().map(|(k, v)| CountRow {
                group: "metric".to_string(),
                key: k.to_string(),
                count: *v,
            }));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal alerts (last {} days): {}", days, stats.total_alerts);
            println!(
                "Mean resolution time: {:.2}h",
                stats.resolution_time_avg_hours
            );
        }
    }
    Ok(())
}

//! Read-only reports over local state

use aiops_lib::{
    analytics::{PerformanceAnalyzer, TrendDirection},
    query::QueryService,
    AutomationRule, MetricKind,
};
use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tabled::Tabled;

use crate::output::{
    color_grade, color_incident_status, color_priority, format_time, print_info, print_json,
    print_list, OutputFormat,
};
use crate::session::Session;

#[derive(Tabled)]
struct IncidentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

#[derive(Tabled)]
struct SeriesRow {
    #[tabled(rename = "Metric")]
    kind: String,
    #[tabled(rename = "Points")]
    points: usize,
    #[tabled(rename = "Latest")]
    latest: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
}

#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Metric")]
    kind: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Avg")]
    avg: String,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Active")]
    active: String,
}

pub async fn incidents(session: &Session, format: OutputFormat) -> Result<()> {
    let incidents = QueryService::new(session.store.clone()).incidents().await?;
    print_list(
        &incidents,
        |incidents| {
            incidents
                .iter()
                .map(|i| IncidentRow {
                    id: i.id.to_string(),
                    title: i.title.clone(),
                    priority: color_priority(i.priority),
                    status: color_incident_status(i.status),
                    created_at: format_time(i.created_at),
                })
                .collect()
        },
        "incidents",
        format,
    )
}

pub async fn summary(session: &Session, format: OutputFormat) -> Result<()> {
    let summary = QueryService::new(session.store.clone())
        .dashboard_summary()
        .await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Dashboard".bold());
            println!("  Open alerts:               {}", summary.open_alert_count);
            println!("  Open incidents:            {}", summary.open_incident_count);
            println!(
                "  Automation runs (last 24h): {}",
                summary.automation_runs_last_24h
            );
        }
    }
    Ok(())
}

pub async fn metrics(
    session: &Session,
    hostname: &str,
    hours: i64,
    format: OutputFormat,
) -> Result<()> {
    let series = QueryService::new(session.store.clone())
        .metrics_series(hostname, hours)
        .await?;

    match format {
        OutputFormat::Json => print_json(&series)?,
        OutputFormat::Table => {
            if series.is_empty() {
                print_info(&format!("No samples for {hostname} in the last {hours}h"));
                return Ok(());
            }
            let rows: Vec<SeriesRow> = series
                .iter()
                .map(|(kind, points)| {
                    let values = points.iter().map(|p| p.value);
                    SeriesRow {
                        kind: kind.to_string(),
                        points: points.len(),
                        latest: points
                            .last()
                            .map(|p| format!("{:.2}", p.value))
                            .unwrap_or_default(),
                        min: format!("{:.2}", values.clone().fold(f64::INFINITY, f64::min)),
                        max: format!("{:.2}", values.fold(f64::NEG_INFINITY, f64::max)),
                    }
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }
    Ok(())
}

/// Health score for the host plus the weekly trend of each scored metric
pub async fn health(
    session: &Session,
    hostname: &str,
    hours: i64,
    trend_days: i64,
    format: OutputFormat,
) -> Result<()> {
    let analyzer = PerformanceAnalyzer::new(session.store.clone());
    let score = analyzer.health_score(hostname, hours).await?;
    let mut trends = Vec::new();
    for kind in [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk] {
        if let Some(trend) = analyzer.trend(hostname, kind, trend_days).await? {
            trends.push(trend);
        }
    }

    match format {
        OutputFormat::Json => print_json(&json!({ "health": score, "trends": trends }))?,
        OutputFormat::Table => {
            println!(
                "{} {} {:.2} (grade {})",
                "Health".bold(),
                hostname,
                score.overall_score,
                color_grade(score.grade)
            );
            let rows: Vec<ScoreRow> = score
                .metric_scores
                .iter()
                .map(|(kind, value)| {
                    let trend = trends.iter().find(|t| t.metric_kind == *kind);
                    ScoreRow {
                        kind: kind.to_string(),
                        score: format!("{:.2}", value),
                        trend: trend
                            .map(|t| match t.trend {
                                TrendDirection::Increasing => {
                                    format!("↑ {:+.2}", t.trend_value).red().to_string()
                                }
                                TrendDirection::Decreasing => {
                                    format!("↓ {:+.2}", t.trend_value).green().to_string()
                                }
                                TrendDirection::Stable => "stable".to_string(),
                            })
                            .unwrap_or_else(|| "-".to_string()),
                        current: trend
                            .map(|t| format!("{:.2}", t.current_value))
                            .unwrap_or_else(|| "-".to_string()),
                        avg: trend
                            .map(|t| format!("{:.2}", t.avg_value))
                            .unwrap_or_else(|| "-".to_string()),
                    }
                })
                .collect();
            if rows.is_empty() {
                print_info(&format!("No cpu, memory or disk samples for {hostname}"));
            } else {
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }
        }
    }
    Ok(())
}

pub async fn rules(session: &Session, format: OutputFormat) -> Result<()> {
    let rules = QueryService::new(session.store.clone()).rules().await?;
    print_list(
        &rules,
        |rules: &[AutomationRule]| {
            rules
                .iter()
                .map(|r| RuleRow {
                    name: r.name.clone(),
                    trigger: r.trigger_type.clone(),
                    action: r.action_type.clone(),
                    active: if r.is_active {
                        "yes".green().to_string()
                    } else {
                        "no".dimmed().to_string()
                    },
                })
                .collect()
        },
        "rules",
        format,
    )
}

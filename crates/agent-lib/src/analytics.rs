//! Performance analytics over stored samples and alerts
//!
//! Health scores grade how much headroom a host had, trends summarize one
//! metric over several days, and alert statistics break down recent alerts.

use crate::error::Result;
use crate::models::{AlertStatus, MetricKind, Severity};
use crate::query::{days_before, hours_before};
use crate::store::{AlertFilter, Store};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Kinds that contribute to the health score; lower usage scores higher
const SCORED_KINDS: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk];

/// A trend per point above this magnitude is reported as a direction
const TREND_SIGNIFICANCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub hostname: String,
    pub overall_score: f64,
    pub metric_scores: BTreeMap<MetricKind, f64>,
    pub grade: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric_kind: MetricKind,
    pub trend: TrendDirection,
    pub trend_value: f64,
    pub current_value: f64,
    pub avg_value: f64,
    pub max_value: f64,
    pub min_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total_alerts: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_status: BTreeMap<AlertStatus, usize>,
    pub by_metric_kind: BTreeMap<MetricKind, usize>,
    /// Mean time from creation to resolution, in hours; 0 when nothing resolved
    pub resolution_time_avg_hours: f64,
}

pub fn grade(score: f64) -> char {
    match score {
        s if s >= 90.0 => 'A',
        s if s >= 80.0 => 'B',
        s if s >= 70.0 => 'C',
        s if s >= 60.0 => 'D',
        _ => 'F',
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct PerformanceAnalyzer {
    store: Arc<dyn Store>,
}

impl PerformanceAnalyzer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn health_score(&self, hostname: &str, hours: i64) -> Result<HealthScore> {
        let until = Utc::now();
        let since = hours_before(until, hours)?;
        let samples = self
            .store
            .samples_between(hostname, &SCORED_KINDS, since, until)
            .await?;

        let mut metric_scores = BTreeMap::new();
        for kind in SCORED_KINDS {
            let values: Vec<f64> = samples
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| s.value)
                .collect();
            if values.is_empty() {
                continue;
            }
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            metric_scores.insert(kind, (100.0 - avg).max(0.0));
        }

        let overall = if metric_scores.is_empty() {
            0.0
        } else {
            metric_scores.values().sum::<f64>() / metric_scores.len() as f64
        };

        Ok(HealthScore {
            hostname: hostname.to_string(),
            overall_score: round2(overall),
            metric_scores,
            grade: grade(overall),
        })
    }

    /// `None` when the host has no samples of `kind` in the window
    pub async fn trend(
        &self,
        hostname: &str,
        kind: MetricKind,
        days: i64,
    ) -> Result<Option<TrendAnalysis>> {
        let until = Utc::now();
        let since = days_before(until, days)?;
        let values: Vec<f64> = self
            .store
            .samples_between(hostname, &[kind], since, until)
            .await?
            .into_iter()
            .map(|s| s.value)
            .collect();

        let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
            return Ok(None);
        };
        let count = values.len() as f64;
        let trend_value = if values.len() > 1 {
            (last - first) / count
        } else {
            0.0
        };
        let trend = if trend_value > TREND_SIGNIFICANCE {
            TrendDirection::Increasing
        } else if trend_value < -TREND_SIGNIFICANCE {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        Ok(Some(TrendAnalysis {
            metric_kind: kind,
            trend,
            trend_value: round2(trend_value),
            current_value: last,
            avg_value: values.iter().sum::<f64>() / count,
            max_value: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_value: values.iter().copied().fold(f64::INFINITY, f64::min),
        }))
    }

    pub async fn alert_statistics(&self, days: i64) -> Result<AlertStatistics> {
        let since = days_before(Utc::now(), days)?;
        let alerts = self
            .store
            .list_alerts(&AlertFilter::default().created_since(since))
            .await?;

        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_status: BTreeMap<AlertStatus, usize> =
            AlertStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_metric_kind = BTreeMap::new();
        let mut resolved_hours = Vec::new();

        for alert in &alerts {
            *by_severity.entry(alert.severity).or_default() += 1;
            *by_status.entry(alert.status).or_default() += 1;
            *by_metric_kind.entry(alert.metric_kind).or_default() += 1;
            if let Some(resolved_at) = alert.resolved_at {
                let secs = (resolved_at - alert.created_at).num_milliseconds() as f64 / 1000.0;
                resolved_hours.push(secs / 3600.0);
            }
        }

        let resolution_time_avg_hours = if resolved_hours.is_empty() {
            0.0
        } else {
            resolved_hours.iter().sum::<f64>() / resolved_hours.len() as f64
        };

        Ok(AlertStatistics {
            total_alerts: alerts.len(),
            by_severity,
            by_status,
            by_metric_kind,
            resolution_time_avg_hours,
        })
    }
}

//! Read-only projections over stored state
//!
//! Consumed by the HTTP API and the CLI reports. Nothing here writes to the
//! store.

use crate::error::{AiopsError, Result};
use crate::models::{
    AlertStatus, AutomationExecution, AutomationRule, IncidentPriority, IncidentStatus,
    MetricKind, Severity,
};
use crate::store::{AlertFilter, Store};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Start of a window reaching `hours` back from `until`
pub fn hours_before(until: DateTime<Utc>, hours: i64) -> Result<DateTime<Utc>> {
    lookback(until, hours, Duration::try_hours(hours), "hours")
}

/// Start of a window reaching `days` back from `until`
pub fn days_before(until: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    lookback(until, days, Duration::try_days(days), "days")
}

fn lookback(
    until: DateTime<Utc>,
    amount: i64,
    span: Option<Duration>,
    unit: &str,
) -> Result<DateTime<Utc>> {
    if amount < 0 {
        return Err(AiopsError::InvalidConfig(format!(
            "{unit} must not be negative, got {amount}"
        )));
    }
    span.and_then(|span| until.checked_sub_signed(span))
        .ok_or_else(|| AiopsError::InvalidConfig(format!("{unit} out of range: {amount}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Points per metric kind, each series in timestamp order
pub type MetricSeries = BTreeMap<MetricKind, Vec<SeriesPoint>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub id: Uuid,
    pub title: String,
    pub severity: Severity,
    pub hostname: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSummary {
    pub id: Uuid,
    pub title: String,
    pub priority: IncidentPriority,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub open_alert_count: usize,
    pub open_incident_count: usize,
    pub automation_runs_last_24h: usize,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn Store>,
}

impl QueryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Samples of `hostname` from the last `hours`, grouped by kind
    pub async fn metrics_series(&self, hostname: &str, hours: i64) -> Result<MetricSeries> {
        let until = Utc::now();
        let since = hours_before(until, hours)?;
        let samples = self
            .store
            .samples_between(hostname, &[], since, until)
            .await?;

        let mut series = MetricSeries::new();
        for sample in samples {
            series.entry(sample.kind).or_default().push(SeriesPoint {
                timestamp: sample.timestamp,
                value: sample.value,
            });
        }
        Ok(series)
    }

    pub async fn open_alerts(&self) -> Result<Vec<AlertSummary>> {
        let alerts = self.store.list_alerts(&AlertFilter::open()).await?;
        Ok(alerts
            .into_iter()
            .map(|a| AlertSummary {
                id: a.id,
                title: a.title,
                severity: a.severity,
                hostname: a.hostname,
                created_at: a.created_at,
            })
            .collect())
    }

    pub async fn incidents(&self) -> Result<Vec<IncidentSummary>> {
        let incidents = self.store.list_incidents().await?;
        Ok(incidents
            .into_iter()
            .map(|i| IncidentSummary {
                id: i.id,
                title: i.title,
                priority: i.priority,
                status: i.status,
                created_at: i.created_at,
            })
            .collect())
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let open_alert_count = self
            .store
            .list_alerts(&AlertFilter {
                status: Some(AlertStatus::Open),
                ..AlertFilter::default()
            })
            .await?
            .len();
        let open_incident_count = self
            .store
            .list_incidents()
            .await?
            .iter()
            .filter(|i| i.status.is_open())
            .count();
        let automation_runs_last_24h = self
            .store
            .list_executions(Some(Utc::now() - Duration::hours(24)))
            .await?
            .len();

        Ok(DashboardSummary {
            open_alert_count,
            open_incident_count,
            automation_runs_last_24h,
        })
    }

    pub async fn rules(&self) -> Result<Vec<AutomationRule>> {
        self.store.list_rules().await
    }

    pub async fn recent_executions(&self, hours: i64) -> Result<Vec<AutomationExecution>> {
        let since = hours_before(Utc::now(), hours)?;
        self.store.list_executions(Some(since)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, AutomationRule, Incident, JsonMap, MetricSample, NewAlert};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn alert(status_steps: usize) -> Alert {
        let mut alert = Alert::open(
            NewAlert {
                title: "MEMORY Usage Alert".to_string(),
                description: "MEMORY usage is 91% on web1".to_string(),
                severity: Severity::Medium,
                hostname: "web1".to_string(),
                metric_kind: MetricKind::Memory,
                threshold_value: 85.0,
                current_value: 91.0,
            },
            Utc::now(),
        );
        for _ in 0..status_steps {
            let next = alert.status.next().unwrap();
            alert.transition(next, Utc::now()).unwrap();
        }
        alert
    }

    fn sample(kind: MetricKind, value: f64, at: DateTime<Utc>) -> MetricSample {
        MetricSample::new("web1", kind, value, "%", at)
    }

    #[test]
    fn test_lookback_rejects_unrepresentable_spans() {
        let now = Utc::now();
        assert_eq!(hours_before(now, 2).unwrap(), now - Duration::hours(2));
        assert_eq!(days_before(now, 0).unwrap(), now);

        for result in [
            hours_before(now, i64::MAX),
            days_before(now, i64::MAX),
            hours_before(now, -1),
            days_before(now, i64::MIN),
        ] {
            assert!(matches!(result, Err(AiopsError::InvalidConfig(_))));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_windows_are_invalid() {
        let service = QueryService::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            service.metrics_series("web1", i64::MAX).await,
            Err(AiopsError::InvalidConfig(_))
        ));
        assert!(matches!(
            service.recent_executions(i64::MAX).await,
            Err(AiopsError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_metrics_series_groups_by_kind() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .insert_samples(vec![
                sample(MetricKind::Cpu, 10.0, now - Duration::minutes(2)),
                sample(MetricKind::Cpu, 20.0, now - Duration::minutes(1)),
                sample(MetricKind::Disk, 60.0, now - Duration::minutes(1)),
                sample(MetricKind::Cpu, 99.0, now - Duration::hours(3)),
            ])
            .await
            .unwrap();

        let series = QueryService::new(store)
            .metrics_series("web1", 1)
            .await
            .unwrap();
        let cpu: Vec<f64> = series[&MetricKind::Cpu].iter().map(|p| p.value).collect();
        assert_eq!(cpu, vec![10.0, 20.0]);
        assert_eq!(series[&MetricKind::Disk].len(), 1);

        let body = serde_json::to_value(&series).unwrap();
        assert!(body["cpu"][0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_dashboard_summary_counts() {
        let store = Arc::new(MemoryStore::new());
        store.insert_alert(alert(0)).await.unwrap();
        store.insert_alert(alert(0)).await.unwrap();
        store.insert_alert(alert(1)).await.unwrap();

        let mut investigating =
            Incident::new("A", "a", IncidentPriority::High, "oncall", Utc::now());
        investigating
            .transition(IncidentStatus::Investigating, Utc::now())
            .unwrap();
        let mut identified = Incident::new("B", "b", IncidentPriority::Low, "oncall", Utc::now());
        identified
            .transition(IncidentStatus::Investigating, Utc::now())
            .unwrap();
        identified
            .transition(IncidentStatus::Identified, Utc::now())
            .unwrap();
        store.insert_incident(investigating).await.unwrap();
        store.insert_incident(identified).await.unwrap();
        store
            .insert_incident(Incident::new(
                "C",
                "c",
                IncidentPriority::Medium,
                "oncall",
                Utc::now(),
            ))
            .await
            .unwrap();

        let rule = AutomationRule::new("notify", "alert_created", "send_notification");
        let mut recent = AutomationExecution::running(&rule, JsonMap::new(), Utc::now());
        recent.finish(Ok(json!({"success": true})), Utc::now()).unwrap();
        let old =
            AutomationExecution::running(&rule, JsonMap::new(), Utc::now() - Duration::hours(30));
        store.insert_execution(old).await.unwrap();
        store.insert_execution(recent).await.unwrap();

        let summary = QueryService::new(store).dashboard_summary().await.unwrap();
        assert_eq!(
            summary,
            DashboardSummary {
                open_alert_count: 2,
                open_incident_count: 2,
                automation_runs_last_24h: 1,
            }
        );

        let body = serde_json::to_value(&summary).unwrap();
        assert_eq!(body["automationRunsLast24h"], json!(1));
    }

    #[tokio::test]
    async fn test_open_alerts_and_incidents_projection() {
        let store = Arc::new(MemoryStore::new());
        let open = alert(0);
        store.insert_alert(open.clone()).await.unwrap();
        store.insert_alert(alert(2)).await.unwrap();
        store
            .insert_incident(Incident::new(
                "Outage",
                "x",
                IncidentPriority::Urgent,
                "oncall",
                Utc::now(),
            ))
            .await
            .unwrap();

        let service = QueryService::new(store);
        let alerts = service.open_alerts().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].id, open.id);

        let incidents = service.incidents().await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].priority, IncidentPriority::Urgent);
        assert_eq!(incidents[0].status, IncidentStatus::New);
    }
}

//! Tests for the in-memory store and its snapshot persistence

use super::{AlertFilter, MemoryStore, Store};
use crate::error::AiopsError;
use crate::models::{
    Alert, AlertStatus, AutomationExecution, AutomationRule, Incident, IncidentLog,
    IncidentPriority, JsonMap, MetricKind, MetricSample, NewAlert, Severity,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

fn alert(hostname: &str, severity: Severity) -> Alert {
    Alert::open(
        NewAlert {
            title: "CPU Usage Alert".to_string(),
            description: format!("CPU usage is 95% on {hostname}"),
            severity,
            hostname: hostname.to_string(),
            metric_kind: MetricKind::Cpu,
            threshold_value: 80.0,
            current_value: 95.0,
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn test_insert_samples_rejects_whole_batch_on_invalid_sample() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let batch = vec![
        MetricSample::new("web1", MetricKind::Cpu, 42.0, "%", now),
        MetricSample::new("web1", MetricKind::Memory, f64::NAN, "%", now),
        MetricSample::new("web1", MetricKind::Disk, 50.0, "%", now),
    ];

    let err = store.insert_samples(batch).await.unwrap_err();
    assert!(matches!(err, AiopsError::PersistenceFailure(_)));
    assert_eq!(store.sample_count(), 0);
}

#[tokio::test]
async fn test_samples_between_orders_and_filters() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let late = MetricSample::new("web1", MetricKind::Cpu, 3.0, "%", now);
    let early = MetricSample::new("web1", MetricKind::Cpu, 1.0, "%", now - Duration::minutes(10));
    let mid = MetricSample::new("web1", MetricKind::Memory, 2.0, "%", now - Duration::minutes(5));
    let other_host = MetricSample::new("db1", MetricKind::Cpu, 9.0, "%", now);

    assert_ok!(store.insert_samples(vec![late.clone(), other_host]).await);
    assert_ok!(store.insert_samples(vec![early.clone(), mid.clone()]).await);

    let all = store
        .samples_between("web1", &[], now - Duration::hours(1), now)
        .await
        .unwrap();
    let values: Vec<f64> = all.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);

    let cpu_only = store
        .samples_between("web1", &[MetricKind::Cpu], now - Duration::hours(1), now)
        .await
        .unwrap();
    assert_eq!(cpu_only.len(), 2);

    let windowed = store
        .samples_between("web1", &[], now - Duration::minutes(6), now - Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(windowed, vec![mid]);
}

#[tokio::test]
async fn test_latest_sample_respects_window() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let stale = MetricSample::new("web1", MetricKind::Cpu, 99.0, "%", now - Duration::minutes(30));
    assert_ok!(store.insert_samples(vec![stale]).await);

    let recent = store
        .latest_sample("web1", MetricKind::Cpu, now - Duration::minutes(5), now)
        .await
        .unwrap();
    assert!(recent.is_none());

    let fresh = MetricSample::new("web1", MetricKind::Cpu, 55.0, "%", now - Duration::minutes(1));
    let memory = MetricSample::new("web1", MetricKind::Memory, 70.0, "%", now);
    assert_ok!(store.insert_samples(vec![fresh, memory]).await);

    let recent = store
        .latest_sample("web1", MetricKind::Cpu, now - Duration::minutes(5), now)
        .await
        .unwrap()
        .expect("fresh sample in window");
    assert_eq!(recent.value, 55.0);
}

#[tokio::test]
async fn test_update_alert_commits_only_on_success() {
    let store = MemoryStore::new();
    let alert = alert("web1", Severity::High);
    let id = alert.id;
    assert_ok!(store.insert_alert(alert).await);

    let result = store
        .update_alert(
            id,
            Box::new(|a: &mut Alert| {
                a.assigned_to = Some("mallory".to_string());
                a.transition(AlertStatus::Closed, Utc::now())
            }),
        )
        .await;
    assert_err!(result);

    let stored = store.get_alert(id).await.unwrap();
    assert_eq!(stored.status, AlertStatus::Open);
    assert!(stored.assigned_to.is_none());
}

#[tokio::test]
async fn test_list_alerts_with_filter() {
    let store = MemoryStore::new();
    assert_ok!(store.insert_alert(alert("web1", Severity::Medium)).await);
    assert_ok!(store.insert_alert(alert("web2", Severity::Critical)).await);

    let open_high = store
        .list_alerts(&AlertFilter::open().with_severities(vec![Severity::High, Severity::Critical]))
        .await
        .unwrap();
    assert_eq!(open_high.len(), 1);
    assert_eq!(open_high[0].hostname, "web2");
}

#[tokio::test]
async fn test_upsert_rule_keeps_identity_and_order() {
    let store = MemoryStore::new();
    let first = store
        .upsert_rule(AutomationRule::new("notify", "alert_created", "send_notification"))
        .await
        .unwrap();
    assert_ok!(
        store
            .upsert_rule(AutomationRule::new("ticket", "alert_created", "create_ticket"))
            .await
    );

    let replaced = store
        .upsert_rule(AutomationRule::new("notify", "alert_created", "run_script").inactive())
        .await
        .unwrap();
    assert_eq!(replaced.id, first.id);

    let rules = store.list_rules().await.unwrap();
    let names: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["notify", "ticket"]);
    assert!(!rules[0].is_active);
    assert_eq!(rules[0].action_type, "run_script");
}

#[tokio::test]
async fn test_sealed_execution_cannot_be_rewritten() {
    let store = MemoryStore::new();
    let rule = AutomationRule::new("notify", "alert_created", "send_notification");
    let mut execution = AutomationExecution::running(&rule, JsonMap::new(), Utc::now());
    assert_ok!(store.insert_execution(execution.clone()).await);

    // Still running: completion requires a terminal state
    assert_err!(store.complete_execution(execution.clone()).await);

    execution
        .finish(Ok(json!({"success": true})), Utc::now())
        .unwrap();
    assert_ok!(store.complete_execution(execution.clone()).await);

    let mut tampered = execution.clone();
    tampered.error_message = Some("rewritten".to_string());
    assert_err!(store.complete_execution(tampered).await);

    let stored = store.list_executions(None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].error_message.is_none());
}

#[tokio::test]
async fn test_incident_log_requires_known_incident() {
    let store = MemoryStore::new();
    let incident = Incident::new(
        "Outage",
        "api down",
        IncidentPriority::Medium,
        "system",
        Utc::now(),
    );
    let id = incident.id;

    let orphan = IncidentLog::new(uuid::Uuid::new_v4(), "hello", "system", Utc::now());
    assert_err!(store.append_incident_log(orphan).await);

    assert_ok!(store.insert_incident(incident).await);
    assert_ok!(
        store
            .append_incident_log(IncidentLog::new(id, "created", "system", Utc::now()))
            .await
    );
    assert_eq!(store.incident_logs(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state").join("aiops.json");

    {
        let store = MemoryStore::with_persistence(&path).await.unwrap();
        let now = Utc::now();
        assert_ok!(
            store
                .insert_samples(vec![MetricSample::new("web1", MetricKind::Cpu, 12.5, "%", now)])
                .await
        );
        assert_ok!(store.insert_alert(alert("web1", Severity::High)).await);
        assert_ok!(
            store
                .upsert_rule(AutomationRule::new("notify", "alert_created", "send_notification"))
                .await
        );
        assert_ok!(store.flush().await);
    }

    let reopened = MemoryStore::with_persistence(&path).await.unwrap();
    assert_eq!(reopened.sample_count(), 1);
    assert_eq!(reopened.list_alerts(&AlertFilter::default()).await.unwrap().len(), 1);
    assert_eq!(reopened.list_rules().await.unwrap().len(), 1);
    assert_eq!(reopened.persistence_path(), Some(path.as_path()));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_a_setup_failure() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("aiops.json");
    std::fs::write(&path, b"{not json").unwrap();

    let result = MemoryStore::with_persistence(&path).await;
    assert!(matches!(result, Err(AiopsError::PersistenceFailure(_))));
}

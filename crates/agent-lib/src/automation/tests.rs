//! Rule engine and executor tests with a recording command runner

use super::*;
use crate::error::{AiopsError, Result};
use crate::models::{
    Alert, AutomationRule, ExecutionStatus, Incident, IncidentPriority, JsonMap, MetricKind,
    MetricSample, NewAlert, Severity,
};
use crate::store::{MemoryStore, Store};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Records every invocation and answers with a fixed output
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    fail_with: Option<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingRunner {
    fn failing(stderr: &str) -> Self {
        Self {
            fail_with: Some(stderr.to_string()),
            ..Default::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(match &self.fail_with {
            Some(stderr) => CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.clone(),
            },
            None => CommandOutput {
                success: true,
                code: Some(0),
                stdout: "ok".to_string(),
                stderr: String::new(),
            },
        })
    }
}

fn map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

fn rule(
    name: &str,
    trigger: &str,
    conditions: Value,
    action: &str,
    config: Value,
) -> AutomationRule {
    AutomationRule::new(name, trigger, action)
        .with_conditions(map(conditions))
        .with_action_config(map(config))
}

fn notify(name: &str, trigger: &str, conditions: Value) -> AutomationRule {
    rule(name, trigger, conditions, "send_notification", json!({}))
}

async fn open_alert(store: &MemoryStore, severity: Severity) -> Alert {
    let alert = Alert::open(
        NewAlert {
            title: "CPU Usage Alert".to_string(),
            description: "CPU usage is 99% on web1".to_string(),
            severity,
            hostname: "web1".to_string(),
            metric_kind: MetricKind::Cpu,
            threshold_value: 80.0,
            current_value: 99.0,
        },
        Utc::now(),
    );
    store.insert_alert(alert.clone()).await.unwrap();
    alert
}

fn executor(store: Arc<MemoryStore>, runner: Arc<RecordingRunner>) -> ActionExecutor {
    ActionExecutor::new(store, runner, ExecutorConfig::default())
}

fn engine(store: Arc<MemoryStore>) -> RuleEngine {
    RuleEngine::new(store, RuleEngineConfig::default())
}

#[tokio::test]
async fn test_alert_created_rule_fires_and_notification_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let alert = open_alert(&store, Severity::High).await;
    let notify = rule(
        "notify",
        "alertCreated",
        json!({"severities": ["high", "critical"]}),
        "sendNotification",
        json!({}),
    );

    let fired = engine(store.clone()).evaluate(&[notify]).await.unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].trigger_data["alert_ids"], json!([alert.id.to_string()]));

    let runner = Arc::new(RecordingRunner::default());
    let execution = executor(store.clone(), runner.clone())
        .execute(&fired[0])
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(execution.completed_at.is_some());
    assert_eq!(execution.result["message"], json!("Notification sent"));
    assert!(runner.calls().is_empty());

    let stored = store.list_executions(None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], execution);
}

#[tokio::test]
async fn test_alert_rule_ignores_lower_severities_and_inactive_rules() {
    let store = Arc::new(MemoryStore::new());
    open_alert(&store, Severity::Medium).await;
    let rules = vec![
        notify("hi", "alert_created", json!({})),
        notify("med", "alert_created", json!({"severities": ["medium"]})).inactive(),
    ];
    assert!(engine(store).evaluate(&rules).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_without_service_name_fails_without_subprocess() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(RecordingRunner::default());
    let fired = FiredRule {
        rule: rule("restart", "alert_created", json!({}), "restartService", json!({})),
        trigger_data: JsonMap::new(),
    };

    let execution = executor(store, runner.clone()).execute(&fired).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    let message = execution.error_message.unwrap();
    assert!(message.contains("Service name not specified"), "{message}");
    assert!(execution.completed_at.is_some());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_run_script_without_path_fails_without_subprocess() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(RecordingRunner::default());
    let fired = FiredRule {
        rule: rule("script", "schedule", json!({}), "run_script", json!({"args": ["x"]})),
        trigger_data: JsonMap::new(),
    };

    let execution = executor(store, runner.clone()).execute(&fired).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.unwrap().contains("Script path not specified"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_restart_invokes_systemctl_and_captures_stderr_on_failure() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(RecordingRunner::failing("Unit nginx.service not found.\n"));
    let fired = FiredRule {
        rule: rule(
            "restart",
            "alert_created",
            json!({}),
            "restart_service",
            json!({"service_name": "nginx"}),
        ),
        trigger_data: JsonMap::new(),
    };

    let execution = executor(store, runner.clone()).execute(&fired).await.unwrap();
    assert_eq!(
        runner.calls(),
        vec![(
            "systemctl".to_string(),
            vec!["restart".to_string(), "nginx".to_string()]
        )]
    );
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(
        execution.error_message.as_deref(),
        Some("Failed to restart service: Unit nginx.service not found.")
    );
}

#[tokio::test]
async fn test_unknown_action_type_fails_only_its_execution() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(RecordingRunner::default());
    let fired = vec![
        FiredRule {
            rule: rule("bogus", "alert_created", json!({}), "reboot_datacenter", json!({})),
            trigger_data: JsonMap::new(),
        },
        FiredRule {
            rule: rule("broken", "alert_created", json!({}), "restart_service", json!({})),
            trigger_data: JsonMap::new(),
        },
        FiredRule {
            rule: notify("notify", "alert_created", json!({})),
            trigger_data: JsonMap::new(),
        },
    ];

    let batch = executor(store.clone(), runner).execute_all(fired, None).await;
    assert_eq!(batch.executions.len(), 3);
    assert_eq!(batch.failed(), 2);
    assert_eq!(batch.succeeded(), 1);
    assert_eq!(
        batch.executions[0].error_message.as_deref(),
        Some("Unknown action type: reboot_datacenter")
    );
    let names: Vec<&str> = batch.executions.iter().map(|e| e.rule_name.as_str()).collect();
    assert_eq!(names, vec!["bogus", "broken", "notify"]);
    assert_eq!(store.list_executions(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_firing_twice_creates_two_executions() {
    let store = Arc::new(MemoryStore::new());
    open_alert(&store, Severity::Critical).await;
    let rules = vec![notify("notify", "alert_created", json!({}))];
    let engine = engine(store.clone());
    let executor = executor(store.clone(), Arc::new(RecordingRunner::default()));

    for _ in 0..2 {
        let fired = engine.evaluate(&rules).await.unwrap();
        executor.execute_all(fired, None).await;
    }

    let executions = store.list_executions(None).await.unwrap();
    assert_eq!(executions.len(), 2);
    assert_ne!(executions[0].id, executions[1].id);
}

#[tokio::test]
async fn test_metric_threshold_uses_latest_recent_sample() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    let minutes_ago = |minutes| now - ChronoDuration::minutes(minutes);
    store
        .insert_samples(vec![
            MetricSample::new("web1", MetricKind::Cpu, 95.0, "%", minutes_ago(3)),
            MetricSample::new("web1", MetricKind::Cpu, 70.0, "%", minutes_ago(1)),
            MetricSample::new("web1", MetricKind::Disk, 97.0, "%", minutes_ago(30)),
        ])
        .await
        .unwrap();

    let rules = vec![
        notify("cpu-80", "metricThreshold", json!({"hostname": "web1", "metric_type": "cpu"})),
        notify(
            "cpu-60",
            "metric_threshold",
            json!({"hostname": "web1", "metric_type": "cpu", "threshold": 60}),
        ),
        notify(
            "stale-disk",
            "metric_threshold",
            json!({"hostname": "web1", "metric_type": "disk", "threshold": 90}),
        ),
        notify("no-host", "metric_threshold", json!({"metric_type": "cpu", "threshold": 1})),
    ];

    let fired = engine(store).evaluate(&rules).await.unwrap();
    let names: Vec<&str> = fired.iter().map(|f| f.rule.name.as_str()).collect();
    assert_eq!(names, vec!["cpu-60"]);
    assert_eq!(fired[0].trigger_data["value"], json!(70.0));
}

#[tokio::test]
async fn test_incident_created_trigger_and_schedule_never_fires() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_incident(Incident::new(
            "DB down",
            "primary unreachable",
            IncidentPriority::Urgent,
            "oncall",
            Utc::now(),
        ))
        .await
        .unwrap();
    let rules = vec![
        notify("escalate", "incidentCreated", json!({})),
        rule(
            "nightly",
            "schedule",
            json!({"cron": "0 0 * * *"}),
            "run_script",
            json!({"script_path": "/bin/true"}),
        ),
    ];

    let fired = engine(store).evaluate(&rules).await.unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].rule.name, "escalate");
}

#[tokio::test]
async fn test_create_ticket_opens_incident_with_log() {
    let store = Arc::new(MemoryStore::new());
    let fired = FiredRule {
        rule: rule(
            "ticket",
            "alert_created",
            json!({}),
            "createTicket",
            json!({"title": "Disk full on db1", "affectedServices": ["postgres"]}),
        ),
        trigger_data: JsonMap::new(),
    };

    let execution = executor(store.clone(), Arc::new(RecordingRunner::default()))
        .execute(&fired)
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);

    let incidents = store.list_incidents().await.unwrap();
    assert_eq!(incidents.len(), 1);
    let incident = &incidents[0];
    assert_eq!(execution.result["incident_id"], json!(incident.id));
    assert_eq!(incident.title, "Disk full on db1");
    assert_eq!(incident.description, DEFAULT_TICKET_DESCRIPTION);
    assert_eq!(incident.priority, IncidentPriority::Medium);
    assert_eq!(incident.created_by, "system");
    assert!(incident.affected_services.contains("postgres"));

    let logs = store.incident_logs(incident.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.contains("'ticket'"));
}

#[tokio::test]
async fn test_same_service_restarts_are_serialized() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(RecordingRunner::slow(Duration::from_millis(50)));
    let executor = ActionExecutor::new(
        store,
        runner.clone(),
        ExecutorConfig {
            max_parallel: 4,
            ..ExecutorConfig::default()
        },
    );
    let fired: Vec<FiredRule> = (0..3)
        .map(|i| FiredRule {
            rule: rule(
                &format!("restart-{i}"),
                "alert_created",
                json!({}),
                "restart_service",
                json!({"service_name": "nginx"}),
            ),
            trigger_data: JsonMap::new(),
        })
        .collect();

    let batch = executor.execute_all(fired, None).await;
    assert_eq!(batch.succeeded(), 3);
    assert_eq!(runner.calls().len(), 3);
    assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_deadline_skips_unstarted_rules() {
    let store = Arc::new(MemoryStore::new());
    let fired = vec![FiredRule {
        rule: notify("notify", "alert_created", json!({})),
        trigger_data: JsonMap::new(),
    }];

    let batch = executor(store.clone(), Arc::new(RecordingRunner::default()))
        .execute_all(fired, Some(Instant::now()))
        .await;
    assert_eq!(batch.skipped, 1);
    assert!(batch.executions.is_empty());
    assert!(store.list_executions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_action_timeout_fails_the_execution() {
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(RecordingRunner::slow(Duration::from_secs(5)));
    let executor = ActionExecutor::new(
        store,
        runner,
        ExecutorConfig {
            action_timeout: Duration::from_millis(20),
            ..ExecutorConfig::default()
        },
    );
    let fired = FiredRule {
        rule: rule(
            "script",
            "alert_created",
            json!({}),
            "run_script",
            json!({"script_path": "/opt/heal.sh"}),
        ),
        trigger_data: JsonMap::new(),
    };

    let execution = executor.execute(&fired).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error_message.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_sync_rules_upserts_by_name() {
    let store = MemoryStore::new();
    let first = vec![notify("notify", "alert_created", json!({}))];
    assert_eq!(sync_rules(&store, first).await.unwrap(), 1);
    let id = store.list_rules().await.unwrap()[0].id;

    let second = vec![rule("notify", "alert_created", json!({}), "create_ticket", json!({}))];
    sync_rules(&store, second).await.unwrap();
    let rules = store.list_rules().await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, id);
    assert_eq!(rules[0].action_type, "create_ticket");
}

#[test]
fn test_missing_parameter_is_not_recoverable() {
    let err = AiopsError::MissingParameter {
        param: "service_name",
        what: "Service name",
    };
    assert!(!err.is_recoverable());
}

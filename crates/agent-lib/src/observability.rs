//! Observability infrastructure for the AIOps loop
//!
//! Provides:
//! - Prometheus metrics (samples collected, sensor timeouts, alerts opened,
//!   rules fired, execution outcomes, cycle latency)
//! - Structured JSON logging with tracing

use crate::models::{Alert, AutomationExecution, AutomationRule, ExecutionStatus};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle durations (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AiopsMetricsInner> = OnceLock::new();

struct AiopsMetricsInner {
    cycle_duration_seconds: Histogram,
    samples_collected: IntCounter,
    sensor_failures: IntCounterVec,
    alerts_opened: IntCounterVec,
    anomalies_detected: IntCounter,
    rules_fired: IntCounter,
    executions: IntCounterVec,
    actions_skipped: IntCounter,
    cycle_errors: IntCounter,
}

impl AiopsMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "aiops_cycle_duration_seconds",
                "Wall time of one sample/score/evaluate/execute cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            samples_collected: register_int_counter!(
                "aiops_samples_collected_total",
                "Metric samples persisted by the collector"
            )
            .expect("Failed to register samples_collected"),

            sensor_failures: register_int_counter_vec!(
                "aiops_sensor_failures_total",
                "Sensor reads skipped for a cycle",
                &["kind", "reason"]
            )
            .expect("Failed to register sensor_failures"),

            alerts_opened: register_int_counter_vec!(
                "aiops_alerts_opened_total",
                "Alerts opened, by source",
                &["source", "severity"]
            )
            .expect("Failed to register alerts_opened"),

            anomalies_detected: register_int_counter!(
                "aiops_anomalies_detected_total",
                "Samples flagged by the outlier model"
            )
            .expect("Failed to register anomalies_detected"),

            rules_fired: register_int_counter!(
                "aiops_rules_fired_total",
                "Automation rules whose trigger held during evaluation"
            )
            .expect("Failed to register rules_fired"),

            executions: register_int_counter_vec!(
                "aiops_automation_executions_total",
                "Automation executions by action and outcome",
                &["action", "status"]
            )
            .expect("Failed to register executions"),

            actions_skipped: register_int_counter!(
                "aiops_actions_skipped_total",
                "Fired rules not started because the cycle budget ran out"
            )
            .expect("Failed to register actions_skipped"),

            cycle_errors: register_int_counter!(
                "aiops_cycle_errors_total",
                "Cycles aborted by a setup-level failure"
            )
            .expect("Failed to register cycle_errors"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AiopsMetrics {
    _private: (),
}

impl Default for AiopsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AiopsMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiopsMetrics").finish()
    }
}

impl AiopsMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AiopsMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AiopsMetricsInner {
        GLOBAL_METRICS.get_or_init(AiopsMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    pub fn add_samples_collected(&self, count: u64) {
        self.inner().samples_collected.inc_by(count);
    }

    pub fn inc_sensor_failure(&self, kind: &str, reason: &str) {
        self.inner()
            .sensor_failures
            .with_label_values(&[kind, reason])
            .inc();
    }

    pub fn inc_alert_opened(&self, source: &str, severity: &str) {
        self.inner()
            .alerts_opened
            .with_label_values(&[source, severity])
            .inc();
    }

    pub fn add_anomalies_detected(&self, count: u64) {
        self.inner().anomalies_detected.inc_by(count);
    }

    pub fn inc_rules_fired(&self) {
        self.inner().rules_fired.inc();
    }

    pub fn inc_execution(&self, action: &str, status: ExecutionStatus) {
        self.inner()
            .executions
            .with_label_values(&[action, status.as_str()])
            .inc();
    }

    pub fn add_actions_skipped(&self, count: u64) {
        self.inner().actions_skipped.inc_by(count);
    }

    pub fn inc_cycle_errors(&self) {
        self.inner().cycle_errors.inc();
    }
}

/// Structured logger for loop events
///
/// Every event carries a stable `event` field so log pipelines can
/// filter on it without parsing messages.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a static threshold breach that opened an alert
    pub fn log_threshold_breach(&self, alert: &Alert) {
        warn!(
            event = "threshold_breach",
            instance = %self.instance,
            alert_id = %alert.id,
            hostname = %alert.hostname,
            metric_kind = %alert.metric_kind,
            severity = %alert.severity,
            threshold = alert.threshold_value,
            value = alert.current_value,
            "Threshold breached"
        );
    }

    /// Log an anomaly flag that opened an alert
    pub fn log_anomaly(&self, alert: &Alert) {
        info!(
            event = "anomaly_detected",
            instance = %self.instance,
            alert_id = %alert.id,
            hostname = %alert.hostname,
            metric_kind = %alert.metric_kind,
            value = alert.current_value,
            "Anomaly detected"
        );
    }

    pub fn log_rule_fired(&self, rule: &AutomationRule) {
        info!(
            event = "rule_fired",
            instance = %self.instance,
            rule = %rule.name,
            rule_id = %rule.id,
            trigger_type = %rule.trigger_type,
            action_type = %rule.action_type,
            "Automation rule fired"
        );
    }

    /// Log the terminal state of an automation execution
    pub fn log_execution(&self, execution: &AutomationExecution, action_type: &str) {
        let duration_ms = execution
            .completed_at
            .map(|done| (done - execution.started_at).num_milliseconds());

        match execution.status {
            ExecutionStatus::Failed => {
                warn!(
                    event = "automation_execution_completed",
                    instance = %self.instance,
                    execution_id = %execution.id,
                    rule = %execution.rule_name,
                    action_type = %action_type,
                    status = %execution.status,
                    error = execution.error_message.as_deref().unwrap_or_default(),
                    duration_ms = ?duration_ms,
                    "Automation execution failed"
                );
            }
            _ => {
                info!(
                    event = "automation_execution_completed",
                    instance = %self.instance,
                    execution_id = %execution.id,
                    rule = %execution.rule_name,
                    action_type = %action_type,
                    status = %execution.status,
                    duration_ms = ?duration_ms,
                    "Automation execution completed"
                );
            }
        }
    }

    pub fn log_cycle(
        &self,
        samples_collected: usize,
        anomalies_found: usize,
        rules_fired: usize,
        executions_failed: usize,
        duration_ms: u128,
    ) {
        info!(
            event = "cycle_completed",
            instance = %self.instance,
            samples_collected = samples_collected,
            anomalies_found = anomalies_found,
            rules_fired = rules_fired,
            executions_failed = executions_failed,
            duration_ms = duration_ms as u64,
            "Cycle complete"
        );
    }

    pub fn log_startup(&self, version: &str, hosts: &[String]) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            hosts = ?hosts,
            "AIOps agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "AIOps agent shutting down"
        );
    }
}

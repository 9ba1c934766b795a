//! Rule evaluation against one snapshot of alert and incident state

use super::triggers::Trigger;
use crate::error::Result;
use crate::models::{Alert, AutomationRule, Incident, IncidentStatus, JsonMap};
use crate::observability::{AiopsMetrics, StructuredLogger};
use crate::store::{AlertFilter, Store};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RuleEngineConfig {
    /// How old the latest sample may be for a metric trigger (default: 5 minutes)
    pub metric_lookback: Duration,
    /// Threshold for metric triggers that do not name one (default: 80)
    pub default_threshold: f64,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            metric_lookback: Duration::minutes(5),
            default_threshold: 80.0,
        }
    }
}

/// State every rule of one evaluation pass observes
///
/// Metric lookups are bounded by `taken_at` so samples written while the
/// pass runs are not seen.
#[derive(Debug, Clone)]
pub struct EvaluationSnapshot {
    pub taken_at: DateTime<Utc>,
    pub open_alerts: Vec<Alert>,
    pub new_incidents: Vec<Incident>,
}

/// A rule whose trigger held, with the facts that made it fire
#[derive(Debug, Clone)]
pub struct FiredRule {
    pub rule: AutomationRule,
    pub trigger_data: JsonMap,
}

pub struct RuleEngine {
    store: Arc<dyn Store>,
    config: RuleEngineConfig,
    metrics: AiopsMetrics,
    logger: StructuredLogger,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn Store>, config: RuleEngineConfig) -> Self {
        Self {
            store,
            config,
            metrics: AiopsMetrics::new(),
            logger: StructuredLogger::new("rule_engine"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub async fn snapshot(&self) -> Result<EvaluationSnapshot> {
        let taken_at = Utc::now();
        let open_alerts = self.store.list_alerts(&AlertFilter::open()).await?;
        let new_incidents = self
            .store
            .list_incidents()
            .await?
            .into_iter()
            .filter(|i| i.status == IncidentStatus::New)
            .collect();
        Ok(EvaluationSnapshot {
            taken_at,
            open_alerts,
            new_incidents,
        })
    }

    /// Active rules whose trigger currently holds, in rule order
    pub async fn evaluate(&self, rules: &[AutomationRule]) -> Result<Vec<FiredRule>> {
        let snapshot = self.snapshot().await?;
        Ok(self.evaluate_with(rules, &snapshot).await)
    }

    /// Evaluate against a given snapshot; a rule that cannot be interpreted does not fire
    pub async fn evaluate_with(
        &self,
        rules: &[AutomationRule],
        snapshot: &EvaluationSnapshot,
    ) -> Vec<FiredRule> {
        let mut fired = Vec::new();
        for rule in rules.iter().filter(|r| r.is_active) {
            let trigger = match Trigger::from_rule(rule, self.config.default_threshold) {
                Ok(trigger) => trigger,
                Err(e) => {
                    warn!(
                        rule = %rule.name,
                        trigger_type = %rule.trigger_type,
                        error = %e,
                        "Skipping rule with unusable trigger"
                    );
                    continue;
                }
            };

            if let Some(trigger_data) = self.check(rule, &trigger, snapshot).await {
                self.logger.log_rule_fired(rule);
                self.metrics.inc_rules_fired();
                fired.push(FiredRule {
                    rule: rule.clone(),
                    trigger_data,
                });
            }
        }
        fired
    }

    async fn check(
        &self,
        rule: &AutomationRule,
        trigger: &Trigger,
        snapshot: &EvaluationSnapshot,
    ) -> Option<JsonMap> {
        match trigger {
            Trigger::AlertCreated { severities } => {
                let matching: Vec<&Alert> = snapshot
                    .open_alerts
                    .iter()
                    .filter(|a| severities.contains(&a.severity))
                    .collect();
                if matching.is_empty() {
                    return None;
                }
                let ids: Vec<String> = matching.iter().map(|a| a.id.to_string()).collect();
                object(json!({
                    "trigger_type": "alert_created",
                    "matching_alerts": matching.len(),
                    "alert_ids": ids,
                }))
            }
            Trigger::MetricThreshold {
                hostname,
                kind,
                threshold,
            } => {
                let since = snapshot.taken_at - self.config.metric_lookback;
                let latest = match self
                    .store
                    .latest_sample(hostname, *kind, since, snapshot.taken_at)
                    .await
                {
                    Ok(latest) => latest?,
                    Err(e) => {
                        warn!(
                            rule = %rule.name,
                            hostname = %hostname,
                            metric_kind = %kind,
                            error = %e,
                            "Metric lookup failed, rule not fired"
                        );
                        return None;
                    }
                };
                if latest.value <= *threshold {
                    return None;
                }
                object(json!({
                    "trigger_type": "metric_threshold",
                    "hostname": hostname,
                    "metric_kind": kind,
                    "value": latest.value,
                    "threshold": threshold,
                    "sample_timestamp": latest.timestamp,
                }))
            }
            Trigger::IncidentCreated { priorities } => {
                let ids: Vec<String> = snapshot
                    .new_incidents
                    .iter()
                    .filter(|i| priorities.contains(&i.priority))
                    .map(|i| i.id.to_string())
                    .collect();
                if ids.is_empty() {
                    return None;
                }
                object(json!({
                    "trigger_type": "incident_created",
                    "incident_ids": ids,
                }))
            }
            Trigger::Schedule => None,
        }
    }
}

fn object(value: Value) -> Option<JsonMap> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

//! Typed trigger predicates parsed from rule conditions
//!
//! Rule conditions arrive as free-form JSON. They are parsed here once per
//! evaluation so that a malformed rule is reported by name and skipped
//! instead of failing the cycle.

use crate::error::{AiopsError, Result};
use crate::models::{AutomationRule, IncidentPriority, JsonMap, MetricKind, Severity, TriggerType};
use serde_json::Value;

pub const DEFAULT_ALERT_SEVERITIES: [Severity; 2] = [Severity::High, Severity::Critical];
pub const DEFAULT_INCIDENT_PRIORITIES: [IncidentPriority; 2] =
    [IncidentPriority::High, IncidentPriority::Urgent];

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Any open alert whose severity is in the set
    AlertCreated { severities: Vec<Severity> },
    /// Latest recent sample of (hostname, kind) strictly above `threshold`
    MetricThreshold {
        hostname: String,
        kind: MetricKind,
        threshold: f64,
    },
    /// Any incident still in `new` whose priority is in the set
    IncidentCreated { priorities: Vec<IncidentPriority> },
    /// Reserved; never fires
    Schedule,
}

impl Trigger {
    /// Parse the trigger of `rule`; `default_threshold` applies to metric triggers without one
    pub fn from_rule(rule: &AutomationRule, default_threshold: f64) -> Result<Self> {
        let conditions = &rule.trigger_conditions;
        match rule.trigger_type.parse::<TriggerType>()? {
            TriggerType::AlertCreated => Ok(Trigger::AlertCreated {
                severities: parse_list(conditions, "severities", &DEFAULT_ALERT_SEVERITIES)?,
            }),
            TriggerType::MetricThreshold => {
                let hostname = conditions
                    .get("hostname")
                    .and_then(Value::as_str)
                    .filter(|h| !h.trim().is_empty())
                    .ok_or_else(|| {
                        AiopsError::InvalidConfig(format!(
                            "rule '{}': metric trigger needs a hostname",
                            rule.name
                        ))
                    })?;
                let kind = ["metric_type", "metric_kind", "metricType", "metricKind"]
                    .iter()
                    .find_map(|key| conditions.get(*key).and_then(Value::as_str))
                    .ok_or_else(|| {
                        AiopsError::InvalidConfig(format!(
                            "rule '{}': metric trigger needs a metric_type",
                            rule.name
                        ))
                    })?
                    .parse::<MetricKind>()?;
                let threshold = match conditions.get("threshold") {
                    None | Some(Value::Null) => default_threshold,
                    Some(v) => v.as_f64().ok_or_else(|| {
                        AiopsError::InvalidConfig(format!(
                            "rule '{}': threshold must be a number",
                            rule.name
                        ))
                    })?,
                };
                Ok(Trigger::MetricThreshold {
                    hostname: hostname.to_string(),
                    kind,
                    threshold,
                })
            }
            TriggerType::IncidentCreated => Ok(Trigger::IncidentCreated {
                priorities: parse_list(conditions, "priorities", &DEFAULT_INCIDENT_PRIORITIES)?,
            }),
            TriggerType::Schedule => Ok(Trigger::Schedule),
        }
    }
}

/// A list of enum names under `key`, or `default` when the key is absent
fn parse_list<T>(conditions: &JsonMap, key: &str, default: &[T]) -> Result<Vec<T>>
where
    T: Clone + std::str::FromStr<Err = AiopsError>,
{
    let Some(raw) = conditions.get(key) else {
        return Ok(default.to_vec());
    };
    let items = raw
        .as_array()
        .ok_or_else(|| AiopsError::InvalidConfig(format!("'{key}' must be a list")))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| {
                    AiopsError::InvalidConfig(format!("'{key}' entries must be strings"))
                })?
                .parse::<T>()
        })
        .collect()
}

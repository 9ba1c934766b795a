//! Core data models for the AIOps loop

use crate::error::{AiopsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Untyped key-value payload used for rule conditions, action config and results
pub type JsonMap = serde_json::Map<String, Value>;

/// Kind of metric carried by a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
    ResponseTime,
    ErrorRate,
    Throughput,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
        MetricKind::ResponseTime,
        MetricKind::ErrorRate,
        MetricKind::Throughput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
            MetricKind::ResponseTime => "response_time",
            MetricKind::ErrorRate => "error_rate",
            MetricKind::Throughput => "throughput",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = AiopsError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            "disk" => Ok(MetricKind::Disk),
            "network" => Ok(MetricKind::Network),
            "response_time" | "responsetime" => Ok(MetricKind::ResponseTime),
            "error_rate" | "errorrate" => Ok(MetricKind::ErrorRate),
            "throughput" => Ok(MetricKind::Throughput),
            _ => Err(AiopsError::InvalidConfig(format!("unknown metric kind '{s}'"))),
        }
    }
}

/// A single timestamped observation, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: Uuid,
    pub hostname: String,
    pub kind: MetricKind,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl MetricSample {
    pub fn new(
        hostname: impl Into<String>,
        kind: MetricKind,
        value: f64,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.into(),
            kind,
            value,
            unit: unit.into(),
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AiopsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(AiopsError::InvalidConfig(format!("unknown severity '{s}'"))),
        }
    }
}

/// Alert lifecycle: open -> acknowledged -> resolved -> closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
    Closed,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 4] = [
        AlertStatus::Open,
        AlertStatus::Acknowledged,
        AlertStatus::Resolved,
        AlertStatus::Closed,
    ];

    /// The only status this one may move to
    pub fn next(&self) -> Option<AlertStatus> {
        match self {
            AlertStatus::Open => Some(AlertStatus::Acknowledged),
            AlertStatus::Acknowledged => Some(AlertStatus::Resolved),
            AlertStatus::Resolved => Some(AlertStatus::Closed),
            AlertStatus::Closed => None,
        }
    }

    pub fn can_transition_to(&self, to: AlertStatus) -> bool {
        self.next() == Some(to)
    }

    /// Statuses for which `resolved_at` must be set
    pub fn is_resolved(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = AiopsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            "closed" => Ok(AlertStatus::Closed),
            _ => Err(AiopsError::InvalidConfig(format!("unknown alert status '{s}'"))),
        }
    }
}

/// Parameters for opening a new alert
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub hostname: String,
    pub metric_kind: MetricKind,
    /// Zero means the alert came from a statistical flag, not a fixed limit
    pub threshold_value: f64,
    pub current_value: f64,
}

/// A detected condition awaiting operator or automated handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub hostname: String,
    pub metric_kind: MetricKind,
    pub threshold_value: f64,
    pub current_value: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
}

impl Alert {
    pub fn open(spec: NewAlert, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: spec.title,
            description: spec.description,
            severity: spec.severity,
            status: AlertStatus::Open,
            hostname: spec.hostname,
            metric_kind: spec.metric_kind,
            threshold_value: spec.threshold_value,
            current_value: spec.current_value,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            assigned_to: None,
        }
    }

    /// Move one step forward in the lifecycle, stamping `resolved_at` on resolution
    pub fn transition(&mut self, to: AlertStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(AiopsError::InvalidTransition {
                entity: "alert",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        if to.is_resolved() && self.resolved_at.is_none() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }

    /// Whether this alert came from the anomaly scorer rather than a fixed threshold
    pub fn is_statistical(&self) -> bool {
        self.threshold_value == 0.0
    }
}

/// What makes a rule fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    MetricThreshold,
    AlertCreated,
    IncidentCreated,
    Schedule,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::MetricThreshold => "metric_threshold",
            TriggerType::AlertCreated => "alert_created",
            TriggerType::IncidentCreated => "incident_created",
            TriggerType::Schedule => "schedule",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = AiopsError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_identifier(s).as_str() {
            "metric_threshold" => Ok(TriggerType::MetricThreshold),
            "alert_created" => Ok(TriggerType::AlertCreated),
            "incident_created" => Ok(TriggerType::IncidentCreated),
            "schedule" => Ok(TriggerType::Schedule),
            _ => Err(AiopsError::InvalidConfig(format!("unknown trigger type '{s}'"))),
        }
    }
}

/// The remediation a rule performs once fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    RestartService,
    ScaleResources,
    SendNotification,
    RunScript,
    CreateTicket,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::RestartService => "restart_service",
            ActionType::ScaleResources => "scale_resources",
            ActionType::SendNotification => "send_notification",
            ActionType::RunScript => "run_script",
            ActionType::CreateTicket => "create_ticket",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = AiopsError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_identifier(s).as_str() {
            "restart_service" => Ok(ActionType::RestartService),
            "scale_resources" => Ok(ActionType::ScaleResources),
            "send_notification" => Ok(ActionType::SendNotification),
            "run_script" => Ok(ActionType::RunScript),
            "create_ticket" => Ok(ActionType::CreateTicket),
            _ => Err(AiopsError::UnknownActionType(s.to_string())),
        }
    }
}

/// Accepts both `alert_created` and `alertCreated` spellings
fn normalize_identifier(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.trim().chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '-' {
            out.push('_');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Operator-maintained automation rule
///
/// `trigger_type` and `action_type` stay as raw strings: rules come from
/// configuration and are interpreted at evaluation time, so a typo fails
/// one execution instead of the whole rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_conditions: JsonMap,
    pub action_type: String,
    #[serde(default)]
    pub action_config: JsonMap,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

impl AutomationRule {
    pub fn new(
        name: impl Into<String>,
        trigger_type: impl Into<String>,
        action_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            trigger_type: trigger_type.into(),
            trigger_conditions: JsonMap::new(),
            action_type: action_type.into(),
            action_config: JsonMap::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
            created_by: "operator".to_string(),
        }
    }

    pub fn with_conditions(mut self, conditions: JsonMap) -> Self {
        self.trigger_conditions = conditions;
        self
    }

    pub fn with_action_config(mut self, config: JsonMap) -> Self {
        self.action_config = config;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Execution lifecycle: pending -> running -> success | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one rule firing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub rule_name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub trigger_data: JsonMap,
    #[serde(default)]
    pub result: JsonMap,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AutomationExecution {
    /// Executions are created directly in `running`; `pending` is never persisted
    pub fn running(rule: &AutomationRule, trigger_data: JsonMap, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            status: ExecutionStatus::Running,
            trigger_data,
            result: JsonMap::new(),
            error_message: None,
            started_at: now,
            completed_at: None,
        }
    }

    /// Seal the execution with its handler outcome
    pub fn finish(&mut self, outcome: Result<Value>, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AiopsError::InvalidTransition {
                entity: "execution",
                from: self.status.to_string(),
                to: match outcome {
                    Ok(_) => ExecutionStatus::Success.to_string(),
                    Err(_) => ExecutionStatus::Failed.to_string(),
                },
            });
        }
        match outcome {
            Ok(payload) => {
                self.status = ExecutionStatus::Success;
                self.result = match payload {
                    Value::Object(map) => map,
                    Value::Null => JsonMap::new(),
                    other => {
                        let mut map = JsonMap::new();
                        map.insert("value".to_string(), other);
                        map
                    }
                };
            }
            Err(err) => {
                self.status = ExecutionStatus::Failed;
                self.error_message = Some(err.to_string());
            }
        }
        self.completed_at = Some(now);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl IncidentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentPriority::Low => "low",
            IncidentPriority::Medium => "medium",
            IncidentPriority::High => "high",
            IncidentPriority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentPriority {
    type Err = AiopsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(IncidentPriority::Low),
            "medium" => Ok(IncidentPriority::Medium),
            "high" => Ok(IncidentPriority::High),
            "urgent" => Ok(IncidentPriority::Urgent),
            _ => Err(AiopsError::InvalidConfig(format!(
                "unknown incident priority '{s}'"
            ))),
        }
    }
}

/// Incident lifecycle: new -> investigating -> identified -> monitoring -> resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    New,
    Investigating,
    Identified,
    Monitoring,
    Resolved,
}

impl IncidentStatus {
    pub fn next(&self) -> Option<IncidentStatus> {
        match self {
            IncidentStatus::New => Some(IncidentStatus::Investigating),
            IncidentStatus::Investigating => Some(IncidentStatus::Identified),
            IncidentStatus::Identified => Some(IncidentStatus::Monitoring),
            IncidentStatus::Monitoring => Some(IncidentStatus::Resolved),
            IncidentStatus::Resolved => None,
        }
    }

    /// Counted as open on the dashboard
    pub fn is_open(&self) -> bool {
        matches!(self, IncidentStatus::New | IncidentStatus::Investigating)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::New => "new",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Identified => "identified",
            IncidentStatus::Monitoring => "monitoring",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Higher-level record, created by operators or the `create_ticket` action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: IncidentPriority,
    pub status: IncidentStatus,
    #[serde(default)]
    pub affected_services: BTreeSet<String>,
    pub root_cause: Option<String>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
    pub created_by: String,
}

impl Incident {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: IncidentPriority,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            priority,
            status: IncidentStatus::New,
            affected_services: BTreeSet::new(),
            root_cause: None,
            resolution: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            assigned_to: None,
            created_by: created_by.into(),
        }
    }

    pub fn transition(&mut self, to: IncidentStatus, now: DateTime<Utc>) -> Result<()> {
        if self.status.next() != Some(to) {
            return Err(AiopsError::InvalidTransition {
                entity: "incident",
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        if to == IncidentStatus::Resolved && self.resolved_at.is_none() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }
}

/// Timeline entry attached to an incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentLog {
    pub id: Uuid,
    pub incident_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl IncidentLog {
    pub fn new(
        incident_id: Uuid,
        message: impl Into<String>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_id,
            message: message.into(),
            created_at: now,
            created_by: created_by.into(),
        }
    }
}

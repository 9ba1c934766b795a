//! Queryable state shared by the collector, scorer and automation engine
//!
//! The store is an append/update-mostly repository for the four logical
//! collections: metric samples, alerts, automation rules with their
//! executions, and incidents with their logs. Read-only consumers (the HTTP
//! API, the CLI reports) only ever call the query methods.

mod memory;

#[cfg(test)]
mod tests;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{
    Alert, AlertStatus, AutomationExecution, AutomationRule, Incident, IncidentLog, MetricKind,
    MetricSample, Severity,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// In-place mutation applied to a stored alert; the change commits only on `Ok`
pub type AlertUpdate = Box<dyn FnOnce(&mut Alert) -> Result<()> + Send>;

/// In-place mutation applied to a stored incident; the change commits only on `Ok`
pub type IncidentUpdate = Box<dyn FnOnce(&mut Incident) -> Result<()> + Send>;

/// Filter for alert listings; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severities: Option<Vec<Severity>>,
    pub hostname: Option<String>,
    pub created_since: Option<DateTime<Utc>>,
}

impl AlertFilter {
    pub fn open() -> Self {
        Self {
            status: Some(AlertStatus::Open),
            ..Default::default()
        }
    }

    pub fn with_severities(mut self, severities: Vec<Severity>) -> Self {
        self.severities = Some(severities);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(status) = self.status {
            if alert.status != status {
                return false;
            }
        }
        if let Some(ref severities) = self.severities {
            if !severities.contains(&alert.severity) {
                return false;
            }
        }
        if let Some(ref hostname) = self.hostname {
            if &alert.hostname != hostname {
                return false;
            }
        }
        if let Some(since) = self.created_since {
            if alert.created_at < since {
                return false;
            }
        }
        true
    }
}

/// Persistence boundary for every component of the loop
#[async_trait]
pub trait Store: Send + Sync {
    /// Append a batch of samples; either every sample is stored or none is
    async fn insert_samples(&self, samples: Vec<MetricSample>) -> Result<()>;

    /// Samples for a host in `[since, until]`, ordered by timestamp
    async fn samples_between(
        &self,
        hostname: &str,
        kinds: &[MetricKind],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>>;

    /// Most recent sample of one kind for a host in `[since, until]`
    async fn latest_sample(
        &self,
        hostname: &str,
        kind: MetricKind,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<MetricSample>>;

    async fn insert_alert(&self, alert: Alert) -> Result<()>;

    async fn get_alert(&self, id: Uuid) -> Result<Alert>;

    /// Apply `update` to the stored alert atomically and return the new state
    async fn update_alert(&self, id: Uuid, update: AlertUpdate) -> Result<Alert>;

    /// Alerts matching `filter`, in creation order
    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Insert a rule, or replace the rule with the same name keeping its id
    async fn upsert_rule(&self, rule: AutomationRule) -> Result<AutomationRule>;

    /// All rules in insertion order
    async fn list_rules(&self) -> Result<Vec<AutomationRule>>;

    async fn insert_execution(&self, execution: AutomationExecution) -> Result<()>;

    /// Persist the terminal state of a running execution; sealed records are refused
    async fn complete_execution(&self, execution: AutomationExecution) -> Result<()>;

    /// Executions started at or after `since`, in start order
    async fn list_executions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AutomationExecution>>;

    async fn insert_incident(&self, incident: Incident) -> Result<()>;

    async fn update_incident(&self, id: Uuid, update: IncidentUpdate) -> Result<Incident>;

    async fn list_incidents(&self) -> Result<Vec<Incident>>;

    async fn append_incident_log(&self, log: IncidentLog) -> Result<()>;

    async fn incident_logs(&self, incident_id: Uuid) -> Result<Vec<IncidentLog>>;

    /// Make all accepted writes durable
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

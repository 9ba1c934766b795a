//! In-process store with optional JSON snapshot persistence
//!
//! Samples are sharded per host so concurrent collectors for different hosts
//! never contend. Everything else lives behind one `RwLock` per collection.
//! When a persistence path is configured the full state is loaded at startup
//! and rewritten atomically (temp file + rename) on every `flush`.

use super::{AlertFilter, AlertUpdate, IncidentUpdate, Store};
use crate::error::{AiopsError, Result};
use crate::models::{
    Alert, AutomationExecution, AutomationRule, Incident, IncidentLog, MetricKind, MetricSample,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// On-disk layout of a snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    samples: Vec<MetricSample>,
    #[serde(default)]
    alerts: Vec<Alert>,
    #[serde(default)]
    rules: Vec<AutomationRule>,
    #[serde(default)]
    executions: Vec<AutomationExecution>,
    #[serde(default)]
    incidents: Vec<Incident>,
    #[serde(default)]
    incident_logs: Vec<IncidentLog>,
}

/// Store implementation backed by process memory
pub struct MemoryStore {
    /// hostname -> samples ordered by timestamp
    samples: DashMap<String, Vec<MetricSample>>,
    alerts: RwLock<Vec<Alert>>,
    rules: RwLock<Vec<AutomationRule>>,
    executions: RwLock<Vec<AutomationExecution>>,
    incidents: RwLock<Vec<Incident>>,
    incident_logs: RwLock<Vec<IncidentLog>>,
    persistence_path: Option<PathBuf>,
    /// Serializes concurrent flushes to the same file
    flush_lock: tokio::sync::Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            samples: DashMap::new(),
            alerts: RwLock::new(Vec::new()),
            rules: RwLock::new(Vec::new()),
            executions: RwLock::new(Vec::new()),
            incidents: RwLock::new(Vec::new()),
            incident_logs: RwLock::new(Vec::new()),
            persistence_path: None,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open a store persisted at `path`, loading any existing snapshot
    ///
    /// A snapshot that exists but cannot be parsed is a setup failure: the
    /// caller should not silently start from an empty state and overwrite it.
    pub async fn with_persistence(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::new();

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let snapshot = load_snapshot(&path).await?;
            info!(
                path = %path.display(),
                samples = snapshot.samples.len(),
                alerts = snapshot.alerts.len(),
                rules = snapshot.rules.len(),
                "Loaded state snapshot"
            );
            store.restore(snapshot);
        } else {
            debug!(path = %path.display(), "No snapshot found, starting with empty state");
        }

        store.persistence_path = Some(path);
        Ok(store)
    }

    pub fn persistence_path(&self) -> Option<&Path> {
        self.persistence_path.as_deref()
    }

    /// Number of samples across all hosts
    pub fn sample_count(&self) -> usize {
        self.samples.iter().map(|shard| shard.value().len()).sum()
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let mut by_host: HashMap<String, Vec<MetricSample>> = HashMap::new();
        for sample in snapshot.samples {
            by_host.entry(sample.hostname.clone()).or_default().push(sample);
        }
        for (host, mut samples) in by_host {
            samples.sort_by_key(|s| s.timestamp);
            self.samples.insert(host, samples);
        }
        self.alerts = RwLock::new(snapshot.alerts);
        self.rules = RwLock::new(snapshot.rules);
        self.executions = RwLock::new(snapshot.executions);
        self.incidents = RwLock::new(snapshot.incidents);
        self.incident_logs = RwLock::new(snapshot.incident_logs);
    }

    async fn snapshot(&self) -> Snapshot {
        let mut samples: Vec<MetricSample> = self
            .samples
            .iter()
            .flat_map(|shard| shard.value().clone())
            .collect();
        samples.sort_by(|a, b| {
            a.hostname
                .cmp(&b.hostname)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        Snapshot {
            samples,
            alerts: self.alerts.read().await.clone(),
            rules: self.rules.read().await.clone(),
            executions: self.executions.read().await.clone(),
            incidents: self.incidents.read().await.clone(),
            incident_logs: self.incident_logs.read().await.clone(),
        }
    }
}

async fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let content = tokio::fs::read(path).await.map_err(|e| {
        AiopsError::PersistenceFailure(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_slice(&content).map_err(|e| {
        AiopsError::PersistenceFailure(format!("corrupt snapshot {}: {e}", path.display()))
    })
}

async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let data = serde_json::to_vec(snapshot)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AiopsError::PersistenceFailure(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &data).await.map_err(|e| {
        AiopsError::PersistenceFailure(format!("failed to write {}: {e}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        AiopsError::PersistenceFailure(format!("failed to replace {}: {e}", path.display()))
    })?;

    Ok(())
}

fn validate_sample(sample: &MetricSample) -> Result<()> {
    if sample.hostname.trim().is_empty() {
        return Err(AiopsError::PersistenceFailure(format!(
            "sample {} has an empty hostname",
            sample.id
        )));
    }
    if !sample.value.is_finite() {
        return Err(AiopsError::PersistenceFailure(format!(
            "sample {} for {} on {} has non-finite value",
            sample.id, sample.kind, sample.hostname
        )));
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_samples(&self, samples: Vec<MetricSample>) -> Result<()> {
        // Validate the whole batch before touching any shard
        for sample in &samples {
            validate_sample(sample)?;
        }

        let mut by_host: HashMap<String, Vec<MetricSample>> = HashMap::new();
        for sample in samples {
            by_host.entry(sample.hostname.clone()).or_default().push(sample);
        }

        for (host, batch) in by_host {
            let mut shard = self.samples.entry(host).or_default();
            let needs_sort = match (shard.last(), batch.first()) {
                (Some(last), Some(first)) => first.timestamp < last.timestamp,
                _ => false,
            } || batch.windows(2).any(|w| w[1].timestamp < w[0].timestamp);
            shard.extend(batch);
            if needs_sort {
                shard.sort_by_key(|s| s.timestamp);
            }
        }

        Ok(())
    }

    async fn samples_between(
        &self,
        hostname: &str,
        kinds: &[MetricKind],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>> {
        let Some(shard) = self.samples.get(hostname) else {
            return Ok(Vec::new());
        };

        let start = shard.partition_point(|s| s.timestamp < since);
        let end = shard.partition_point(|s| s.timestamp <= until);
        if start >= end {
            return Ok(Vec::new());
        }

        Ok(shard[start..end]
            .iter()
            .filter(|s| kinds.is_empty() || kinds.contains(&s.kind))
            .cloned()
            .collect())
    }

    async fn latest_sample(
        &self,
        hostname: &str,
        kind: MetricKind,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Option<MetricSample>> {
        let Some(shard) = self.samples.get(hostname) else {
            return Ok(None);
        };

        let end = shard.partition_point(|s| s.timestamp <= until);
        Ok(shard[..end]
            .iter()
            .rev()
            .take_while(|s| s.timestamp >= since)
            .find(|s| s.kind == kind)
            .cloned())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<()> {
        self.alerts.write().await.push(alert);
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| AiopsError::NotFound {
                entity: "alert",
                id: id.to_string(),
            })
    }

    async fn update_alert(&self, id: Uuid, update: AlertUpdate) -> Result<Alert> {
        let mut alerts = self.alerts.write().await;
        let slot = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AiopsError::NotFound {
                entity: "alert",
                id: id.to_string(),
            })?;

        let mut draft = slot.clone();
        update(&mut draft)?;
        *slot = draft.clone();
        Ok(draft)
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn upsert_rule(&self, mut rule: AutomationRule) -> Result<AutomationRule> {
        let mut rules = self.rules.write().await;
        if let Some(existing) = rules.iter_mut().find(|r| r.name == rule.name) {
            rule.id = existing.id;
            rule.created_at = existing.created_at;
            rule.updated_at = Utc::now();
            *existing = rule.clone();
        } else {
            rules.push(rule.clone());
        }
        Ok(rule)
    }

    async fn list_rules(&self) -> Result<Vec<AutomationRule>> {
        Ok(self.rules.read().await.clone())
    }

    async fn insert_execution(&self, execution: AutomationExecution) -> Result<()> {
        let mut executions = self.executions.write().await;
        if executions.iter().any(|e| e.id == execution.id) {
            return Err(AiopsError::PersistenceFailure(format!(
                "execution {} already recorded",
                execution.id
            )));
        }
        executions.push(execution);
        Ok(())
    }

    async fn complete_execution(&self, execution: AutomationExecution) -> Result<()> {
        if execution.completed_at.is_none() || !execution.status.is_terminal() {
            return Err(AiopsError::PersistenceFailure(format!(
                "execution {} is not terminal",
                execution.id
            )));
        }

        let mut executions = self.executions.write().await;
        let slot = executions
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or_else(|| AiopsError::NotFound {
                entity: "execution",
                id: execution.id.to_string(),
            })?;

        if slot.completed_at.is_some() {
            warn!(execution_id = %execution.id, "Refusing to rewrite a sealed execution");
            return Err(AiopsError::PersistenceFailure(format!(
                "execution {} is already sealed",
                execution.id
            )));
        }

        *slot = execution;
        Ok(())
    }

    async fn list_executions(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AutomationExecution>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .filter(|e| since.map_or(true, |s| e.started_at >= s))
            .cloned()
            .collect())
    }

    async fn insert_incident(&self, incident: Incident) -> Result<()> {
        self.incidents.write().await.push(incident);
        Ok(())
    }

    async fn update_incident(&self, id: Uuid, update: IncidentUpdate) -> Result<Incident> {
        let mut incidents = self.incidents.write().await;
        let slot = incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AiopsError::NotFound {
                entity: "incident",
                id: id.to_string(),
            })?;

        let mut draft = slot.clone();
        update(&mut draft)?;
        *slot = draft.clone();
        Ok(draft)
    }

    async fn list_incidents(&self) -> Result<Vec<Incident>> {
        Ok(self.incidents.read().await.clone())
    }

    async fn append_incident_log(&self, log: IncidentLog) -> Result<()> {
        let known = self
            .incidents
            .read()
            .await
            .iter()
            .any(|i| i.id == log.incident_id);
        if !known {
            return Err(AiopsError::NotFound {
                entity: "incident",
                id: log.incident_id.to_string(),
            });
        }
        self.incident_logs.write().await.push(log);
        Ok(())
    }

    async fn incident_logs(&self, incident_id: Uuid) -> Result<Vec<IncidentLog>> {
        Ok(self
            .incident_logs
            .read()
            .await
            .iter()
            .filter(|l| l.incident_id == incident_id)
            .cloned()
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        let Some(ref path) = self.persistence_path else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().await;
        let snapshot = self.snapshot().await;
        save_snapshot(path, &snapshot).await?;
        debug!(
            path = %path.display(),
            samples = snapshot.samples.len(),
            executions = snapshot.executions.len(),
            "Flushed state snapshot"
        );
        Ok(())
    }
}

//! Execution of fired rules with per-rule failure isolation
//!
//! Every fired rule gets exactly one [`AutomationExecution`], persisted as
//! `running` before the handler starts and sealed as `success` or `failed`
//! afterwards. Actions touching the same service or script are serialized.

use super::actions::{perform, resource_key, ActionContext, CommandRunner};
use super::engine::FiredRule;
use crate::error::{AiopsError, Result};
use crate::models::{ActionType, AutomationExecution, ExecutionStatus};
use crate::observability::{AiopsMetrics, StructuredLogger};
use crate::store::Store;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline for one action handler (default: 30 seconds)
    pub action_timeout: Duration,
    /// Fired rules executed at once (default: 1, strictly sequential)
    pub max_parallel: usize,
    pub system_actor: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(30),
            max_parallel: 1,
            system_actor: "system".to_string(),
        }
    }
}

/// Outcome of executing one evaluation pass worth of fired rules
#[derive(Debug, Default)]
pub struct ExecutionBatch {
    /// Sealed executions, in fired-rule order
    pub executions: Vec<AutomationExecution>,
    /// Rules not started because the deadline passed
    pub skipped: usize,
    /// Rules whose audit record could not be written
    pub errors: Vec<AiopsError>,
}

impl ExecutionBatch {
    pub fn succeeded(&self) -> usize {
        self.count(ExecutionStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(ExecutionStatus::Failed)
    }

    fn count(&self, status: ExecutionStatus) -> usize {
        self.executions.iter().filter(|e| e.status == status).count()
    }
}

pub struct ActionExecutor {
    store: Arc<dyn Store>,
    context: ActionContext,
    config: ExecutorConfig,
    resource_locks: DashMap<String, Arc<Mutex<()>>>,
    metrics: AiopsMetrics,
    logger: StructuredLogger,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        runner: Arc<dyn CommandRunner>,
        config: ExecutorConfig,
    ) -> Self {
        let context = ActionContext {
            runner,
            store: store.clone(),
            timeout: config.action_timeout,
            system_actor: config.system_actor.clone(),
        };
        Self {
            store,
            context,
            config,
            resource_locks: DashMap::new(),
            metrics: AiopsMetrics::new(),
            logger: StructuredLogger::new("action_executor"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Execute one fired rule and return its sealed audit record
    ///
    /// Handler failures end up in the record, not in the return value. An
    /// `Err` means the record itself could not be persisted.
    pub async fn execute(&self, fired: &FiredRule) -> Result<AutomationExecution> {
        let rule = &fired.rule;
        let mut execution =
            AutomationExecution::running(rule, fired.trigger_data.clone(), Utc::now());
        self.store.insert_execution(execution.clone()).await?;
        debug!(execution_id = %execution.id, rule = %rule.name, "Execution started");

        let parsed = rule.action_type.parse::<ActionType>();
        let label = parsed.as_ref().map(|a| a.as_str()).unwrap_or("unknown");
        let outcome = match parsed {
            Ok(action) => self.run_action(action, fired).await,
            Err(e) => Err(e),
        };

        execution.finish(outcome, Utc::now())?;
        self.store.complete_execution(execution.clone()).await?;

        self.metrics.inc_execution(label, execution.status);
        self.logger.log_execution(&execution, &rule.action_type);
        Ok(execution)
    }

    async fn run_action(&self, action: ActionType, fired: &FiredRule) -> Result<Value> {
        let lock = resource_key(action, &fired.rule.action_config).map(|key| {
            self.resource_locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        });
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        tokio::time::timeout(
            self.config.action_timeout,
            perform(action, &fired.rule, &self.context),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AiopsError::ActionFailed(format!(
                "Action timed out after {}s",
                self.config.action_timeout.as_secs()
            )))
        })
    }

    /// Execute fired rules in order, at most `max_parallel` at a time
    ///
    /// Rules not yet started when `deadline` passes are skipped; started ones
    /// run to completion.
    pub async fn execute_all(
        &self,
        fired: Vec<FiredRule>,
        deadline: Option<Instant>,
    ) -> ExecutionBatch {
        let results: Vec<Option<(String, Result<AutomationExecution>)>> = stream::iter(fired)
            .map(|fired| async move {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return None;
                }
                let result = self.execute(&fired).await;
                Some((fired.rule.name, result))
            })
            .buffered(self.config.max_parallel.max(1))
            .collect()
            .await;

        let mut batch = ExecutionBatch::default();
        for result in results {
            match result {
                None => batch.skipped += 1,
                Some((_, Ok(execution))) => batch.executions.push(execution),
                Some((rule, Err(e))) => {
                    warn!(rule = %rule, error = %e, "Execution record could not be persisted");
                    batch.errors.push(e);
                }
            }
        }

        if batch.skipped > 0 {
            warn!(skipped = batch.skipped, "Cycle budget exhausted, fired rules skipped");
            self.metrics.add_actions_skipped(batch.skipped as u64);
        }
        batch
    }
}

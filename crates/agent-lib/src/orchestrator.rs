//! Cycle driver for the sample, score, evaluate, execute loop
//!
//! One cycle samples every monitored host, scores every host, evaluates
//! active rules against a single snapshot and executes what fired. Per-host
//! and per-rule failures are recorded in the [`CycleReport`]; only a store
//! that cannot be read or flushed fails the cycle.

use crate::alerts::AlertManager;
use crate::anomaly::{AnomalyConfig, AnomalyScorer};
use crate::automation::{
    ActionExecutor, CommandRunner, ExecutorConfig, RuleEngine, RuleEngineConfig,
    SystemCommandRunner,
};
use crate::collector::{Collector, CollectorConfig, HostSensor, SysinfoSensor};
use crate::error::{AiopsError, Result};
use crate::health::HealthRegistry;
use crate::models::{AutomationExecution, ExecutionStatus};
use crate::observability::{AiopsMetrics, StructuredLogger};
use crate::store::Store;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Configuration for the orchestrator loop
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub hosts: Vec<String>,
    /// Time between cycle starts (default: 60 seconds)
    pub interval: Duration,
    /// Work not started within this budget is skipped until the next cycle (default: 50 seconds)
    pub cycle_budget: Duration,
    /// Hosts sampled or scored at once (default: 4)
    pub max_concurrency: usize,
    pub enable_anomaly_detection: bool,
    pub enable_automation: bool,
    /// Executions still `running` after this long are sealed as failed (default: 5 minutes)
    pub stale_execution_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            interval: Duration::from_secs(60),
            cycle_budget: Duration::from_secs(50),
            max_concurrency: 4,
            enable_anomaly_detection: true,
            enable_automation: true,
            stale_execution_grace: Duration::from_secs(300),
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub samples_collected: usize,
    /// Hosts whose sample batch could not be persisted
    pub hosts_failed: Vec<String>,
    pub anomalies_found: usize,
    pub scoring_failed: Vec<String>,
    pub rules_fired: usize,
    pub executions: Vec<AutomationExecution>,
    /// Fired rules not started before the budget ran out
    pub actions_skipped: usize,
    /// Abandoned `running` executions sealed as failed at cycle start
    pub executions_reaped: usize,
    pub budget_exceeded: bool,
    pub duration: Duration,
}

impl CycleReport {
    pub fn executions_succeeded(&self) -> usize {
        self.executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Success)
            .count()
    }

    pub fn executions_failed(&self) -> usize {
        self.executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Failed)
            .count()
    }
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    collector: Collector,
    scorer: AnomalyScorer,
    engine: RuleEngine,
    executor: ActionExecutor,
    config: OrchestratorConfig,
    health: Option<HealthRegistry>,
    metrics: AiopsMetrics,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one full cycle over all configured hosts
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let hosts = self.config.hosts.clone();
        self.run_cycle_for(&hosts).await
    }

    /// Run one full cycle over `hosts`
    pub async fn run_cycle_for(&self, hosts: &[String]) -> Result<CycleReport> {
        let start = Instant::now();
        let deadline = start + self.config.cycle_budget;
        let mut report = CycleReport::default();

        // Rules are fixed for the whole cycle
        let rules = self.store.list_rules().await?;
        report.executions_reaped = self.reap_stale_executions().await?;

        let collector = &self.collector;
        let sampled = self
            .per_host(hosts, deadline, move |host| async move {
                collector.sample(&host).await.map(|s| s.len())
            })
            .await;
        for (host, outcome) in sampled {
            match outcome {
                Some(Ok(count)) => report.samples_collected += count,
                Some(Err(e)) => {
                    warn!(hostname = %host, error = %e, "Host sampling failed");
                    report.hosts_failed.push(host);
                }
                None => report.budget_exceeded = true,
            }
        }

        if self.config.enable_anomaly_detection {
            let scorer = &self.scorer;
            let scored = self
                .per_host(hosts, deadline, move |host| async move { scorer.run(&host).await })
                .await;
            for (host, outcome) in scored {
                match outcome {
                    Some(Ok(found)) => report.anomalies_found += found,
                    Some(Err(e)) => {
                        warn!(hostname = %host, error = %e, "Anomaly scoring failed");
                        report.scoring_failed.push(host);
                    }
                    None => report.budget_exceeded = true,
                }
            }
        }

        if self.config.enable_automation {
            let fired = self.engine.evaluate(&rules).await?;
            report.rules_fired = fired.len();
            let batch = self.executor.execute_all(fired, Some(deadline)).await;
            report.actions_skipped = batch.skipped;
            report.budget_exceeded |= batch.skipped > 0;
            report.executions = batch.executions;
        }

        self.store.flush().await?;

        report.duration = start.elapsed();
        self.metrics
            .observe_cycle_duration(report.duration.as_secs_f64());
        self.logger.log_cycle(
            report.samples_collected,
            report.anomalies_found,
            report.rules_fired,
            report.executions_failed(),
            report.duration.as_millis(),
        );
        Ok(report)
    }

    /// Run `work` per host with bounded concurrency; hosts not started by `deadline` yield `None`
    async fn per_host<'a, F, Fut, T>(
        &'a self,
        hosts: &[String],
        deadline: Instant,
        work: F,
    ) -> Vec<(String, Option<Result<T>>)>
    where
        F: Fn(String) -> Fut + 'a,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let work = &work;
        stream::iter(hosts.iter().cloned())
            .map(|host| async move {
                if Instant::now() >= deadline {
                    warn!(hostname = %host, "Cycle budget exhausted, host skipped");
                    return (host, None);
                }
                let outcome = work(host.clone()).await;
                (host, Some(outcome))
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }

    /// Seal executions left `running` past the grace period
    async fn reap_stale_executions(&self) -> Result<usize> {
        let grace = chrono::Duration::from_std(self.config.stale_execution_grace)
            .map_err(|e| AiopsError::InvalidConfig(format!("stale execution grace: {e}")))?;
        let cutoff = Utc::now() - grace;

        let stale: Vec<AutomationExecution> = self
            .store
            .list_executions(None)
            .await?
            .into_iter()
            .filter(|e| e.status == ExecutionStatus::Running && e.started_at < cutoff)
            .collect();

        let mut reaped = 0;
        for mut execution in stale {
            execution.finish(
                Err(AiopsError::ActionFailed(
                    "Execution abandoned before completion".to_string(),
                )),
                Utc::now(),
            )?;
            self.store.complete_execution(execution.clone()).await?;
            warn!(
                execution_id = %execution.id,
                rule = %execution.rule_name,
                "Sealed abandoned execution as failed"
            );
            reaped += 1;
        }
        Ok(reaped)
    }

    /// Run cycles on the configured interval until shutdown
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            hosts = ?self.config.hosts,
            "Starting orchestrator loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.run_cycle().await;
                    if let Some(health) = &self.health {
                        health.record_cycle(outcome.as_ref()).await;
                    }
                    if let Err(e) = outcome {
                        self.metrics.inc_cycle_errors();
                        error!(error = %e, code = e.code(), "Cycle failed, retrying next interval");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down orchestrator loop");
                    break;
                }
            }
        }
    }
}

/// Builder wiring the loop components around one shared store
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn Store>>,
    sensor: Option<Arc<dyn HostSensor>>,
    runner: Option<Arc<dyn CommandRunner>>,
    health: Option<HealthRegistry>,
    logger: StructuredLogger,
    config: OrchestratorConfig,
    collector: CollectorConfig,
    anomaly: AnomalyConfig,
    rules: RuleEngineConfig,
    executor: ExecutorConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            sensor: None,
            runner: None,
            health: None,
            logger: StructuredLogger::new("aiops"),
            config: OrchestratorConfig::default(),
            collector: CollectorConfig::default(),
            anomaly: AnomalyConfig::default(),
            rules: RuleEngineConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`SysinfoSensor`]
    pub fn sensor(mut self, sensor: Arc<dyn HostSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Defaults to [`SystemCommandRunner`]
    pub fn command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hosts(mut self, hosts: Vec<String>) -> Self {
        self.config.hosts = hosts;
        self
    }

    pub fn collector_config(mut self, config: CollectorConfig) -> Self {
        self.collector = config;
        self
    }

    pub fn anomaly_config(mut self, config: AnomalyConfig) -> Self {
        self.anomaly = config;
        self
    }

    pub fn rule_engine_config(mut self, config: RuleEngineConfig) -> Self {
        self.rules = config;
        self
    }

    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let store = self
            .store
            .ok_or_else(|| AiopsError::InvalidConfig("store is required".to_string()))?;
        if self.config.hosts.is_empty() {
            return Err(AiopsError::InvalidConfig(
                "at least one host must be monitored".to_string(),
            ));
        }
        if self.config.interval.is_zero() {
            return Err(AiopsError::InvalidConfig("cycle interval must be positive".to_string()));
        }
        let sensor = self
            .sensor
            .unwrap_or_else(|| Arc::new(SysinfoSensor::new()));
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(SystemCommandRunner));
        let alerts = AlertManager::new(store.clone());

        Ok(Orchestrator {
            collector: Collector::new(sensor, store.clone(), alerts.clone(), self.collector)
                .with_logger(self.logger.clone()),
            scorer: AnomalyScorer::new(store.clone(), alerts, self.anomaly)
                .with_logger(self.logger.clone()),
            engine: RuleEngine::new(store.clone(), self.rules).with_logger(self.logger.clone()),
            executor: ActionExecutor::new(store.clone(), runner, self.executor)
                .with_logger(self.logger.clone()),
            store,
            config: self.config,
            health: self.health,
            metrics: AiopsMetrics::new(),
            logger: self.logger,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

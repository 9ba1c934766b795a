//! Runtime settings
//!
//! Layered with the `config` crate: an optional TOML file, then `AIOPS_*`
//! environment variables (`__` separates nested keys, e.g.
//! `AIOPS_ANOMALY__SEED=7`). Every key has a default.

use crate::anomaly::AnomalyConfig;
use crate::automation::{ExecutorConfig, RuleEngineConfig};
use crate::collector::{CollectorConfig, Thresholds};
use crate::error::{AiopsError, Result};
use crate::models::{AutomationRule, JsonMap};
use crate::orchestrator::OrchestratorConfig;
use chrono::Utc;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hosts: Vec<String>,
    pub cycle_interval_secs: u64,
    pub cycle_budget_secs: u64,
    pub max_concurrency: usize,
    pub sensor_timeout_ms: u64,
    /// Metric kind name to static limit
    pub thresholds: BTreeMap<String, f64>,
    pub anomaly: AnomalySettings,
    pub rules: RuleSettings,
    pub actions: ActionSettings,
    /// JSON snapshot of the store; state is memory-only when unset
    pub state_file: Option<PathBuf>,
    pub api_port: u16,
    pub enable_anomaly_detection: bool,
    pub enable_automation: bool,
    pub automation_rules: Vec<RuleDefinition>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            cycle_interval_secs: 60,
            cycle_budget_secs: 50,
            max_concurrency: 4,
            sensor_timeout_ms: 2000,
            thresholds: BTreeMap::from([
                ("cpu".to_string(), 80.0),
                ("memory".to_string(), 85.0),
                ("disk".to_string(), 90.0),
            ]),
            anomaly: AnomalySettings::default(),
            rules: RuleSettings::default(),
            actions: ActionSettings::default(),
            state_file: None,
            api_port: 8080,
            enable_anomaly_detection: true,
            enable_automation: true,
            automation_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalySettings {
    pub window_hours: i64,
    pub contamination: f64,
    pub seed: u64,
    pub trees: usize,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            window_hours: 24,
            contamination: 0.1,
            seed: 42,
            trees: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub metric_lookback_secs: i64,
    pub default_threshold: f64,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            metric_lookback_secs: 300,
            default_threshold: 80.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    pub timeout_secs: u64,
    pub max_parallel: usize,
    pub system_actor: String,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_parallel: 1,
            system_actor: "system".to_string(),
        }
    }
}

/// A rule as written in the settings file
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_conditions: JsonMap,
    pub action_type: String,
    #[serde(default)]
    pub action_config: JsonMap,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl RuleDefinition {
    pub fn to_rule(&self) -> AutomationRule {
        let mut rule = AutomationRule::new(&self.name, &self.trigger_type, &self.action_type)
            .with_conditions(self.trigger_conditions.clone())
            .with_action_config(self.action_config.clone());
        rule.description = self.description.clone();
        rule.is_active = self.is_active;
        rule
    }
}

impl Settings {
    /// Load from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        Self::finish(builder.add_source(environment()))
    }

    /// Parse settings from TOML text, ignoring the environment
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::finish(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn finish(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(AiopsError::InvalidConfig("at least one host is required".into()));
        }
        if !(0.0..=0.5).contains(&self.anomaly.contamination) {
            return Err(AiopsError::InvalidConfig(format!(
                "anomaly.contamination must be within [0, 0.5], got {}",
                self.anomaly.contamination
            )));
        }
        if self.cycle_interval_secs == 0 {
            return Err(AiopsError::InvalidConfig("cycle_interval_secs must be positive".into()));
        }
        if self.max_concurrency == 0 || self.actions.max_parallel == 0 {
            return Err(AiopsError::InvalidConfig(
                "max_concurrency and actions.max_parallel must be positive".into(),
            ));
        }
        // Surfaces unknown metric kinds and unusable windows at startup
        Thresholds::from_config(&self.thresholds)?;
        self.anomaly_config()?;
        self.rule_engine_config()?;
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            hosts: self.hosts.clone(),
            interval: Duration::from_secs(self.cycle_interval_secs),
            cycle_budget: Duration::from_secs(self.cycle_budget_secs),
            max_concurrency: self.max_concurrency,
            enable_anomaly_detection: self.enable_anomaly_detection,
            enable_automation: self.enable_automation,
            ..OrchestratorConfig::default()
        }
    }

    pub fn collector_config(&self) -> Result<CollectorConfig> {
        Ok(CollectorConfig {
            sensor_timeout: Duration::from_millis(self.sensor_timeout_ms),
            thresholds: Thresholds::from_config(&self.thresholds)?,
            ..CollectorConfig::default()
        })
    }

    pub fn anomaly_config(&self) -> Result<AnomalyConfig> {
        let hours = self.anomaly.window_hours;
        if hours <= 0 {
            return Err(AiopsError::InvalidConfig(format!(
                "anomaly.window_hours must be positive, got {hours}"
            )));
        }
        Ok(AnomalyConfig {
            window: lookback("anomaly.window_hours", hours, chrono::Duration::try_hours(hours))?,
            contamination: self.anomaly.contamination,
            seed: self.anomaly.seed,
            trees: self.anomaly.trees,
            ..AnomalyConfig::default()
        })
    }

    pub fn rule_engine_config(&self) -> Result<RuleEngineConfig> {
        let secs = self.rules.metric_lookback_secs;
        if secs < 0 {
            return Err(AiopsError::InvalidConfig(format!(
                "rules.metric_lookback_secs must not be negative, got {secs}"
            )));
        }
        Ok(RuleEngineConfig {
            metric_lookback: lookback(
                "rules.metric_lookback_secs",
                secs,
                chrono::Duration::try_seconds(secs),
            )?,
            default_threshold: self.rules.default_threshold,
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            action_timeout: Duration::from_secs(self.actions.timeout_secs),
            max_parallel: self.actions.max_parallel,
            system_actor: self.actions.system_actor.clone(),
        }
    }

    pub fn rules(&self) -> Vec<AutomationRule> {
        self.automation_rules.iter().map(RuleDefinition::to_rule).collect()
    }
}

/// A look-back span that can still be subtracted from the current time
fn lookback(key: &str, value: i64, span: Option<chrono::Duration>) -> Result<chrono::Duration> {
    span.filter(|span| Utc::now().checked_sub_signed(*span).is_some())
        .ok_or_else(|| AiopsError::InvalidConfig(format!("{key} out of range: {value}")))
}

fn environment() -> Environment {
    Environment::with_prefix("AIOPS")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("hosts")
        .try_parsing(true)
}

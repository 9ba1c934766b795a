//! Rule-driven remediation
//!
//! This module provides:
//! - Trigger parsing from free-form rule conditions
//! - The rule engine deciding which active rules fire
//! - Action handlers and the executor that audits every firing

mod actions;
mod engine;
mod executor;
mod triggers;

#[cfg(test)]
mod tests;

pub use actions::{
    perform, resource_key, script_path, service_name, ActionContext, CommandOutput, CommandRunner,
    SystemCommandRunner, DEFAULT_TICKET_DESCRIPTION, DEFAULT_TICKET_TITLE,
};
pub use engine::{EvaluationSnapshot, FiredRule, RuleEngine, RuleEngineConfig};
pub use executor::{ActionExecutor, ExecutionBatch, ExecutorConfig};
pub use triggers::{Trigger, DEFAULT_ALERT_SEVERITIES, DEFAULT_INCIDENT_PRIORITIES};

use crate::error::Result;
use crate::models::AutomationRule;
use crate::store::Store;
use tracing::info;

/// Upsert configured rules by name, keeping ids of rules already stored
pub async fn sync_rules(store: &dyn Store, rules: Vec<AutomationRule>) -> Result<usize> {
    let count = rules.len();
    for rule in rules {
        let stored = store.upsert_rule(rule).await?;
        info!(rule = %stored.name, rule_id = %stored.id, active = stored.is_active, "Rule loaded");
    }
    Ok(count)
}

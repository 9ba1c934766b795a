//! Action handlers, one per [`ActionType`] variant
//!
//! Subprocess actions go through [`CommandRunner`] so the process boundary
//! can be replaced in tests.

use crate::error::{AiopsError, Result};
use crate::models::{ActionType, AutomationRule, Incident, IncidentLog, IncidentPriority, JsonMap};
use crate::store::Store;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_TICKET_TITLE: &str = "Automated Incident";
pub const DEFAULT_TICKET_DESCRIPTION: &str = "Automatically created incident";

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, failing with `ActionFailed` if it cannot be
    /// started or does not exit within `timeout`
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| {
                AiopsError::ActionFailed(format!(
                    "{program} did not finish within {}s",
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| AiopsError::ActionFailed(format!("failed to run {program}: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Collaborators shared by every handler
#[derive(Clone)]
pub struct ActionContext {
    pub runner: Arc<dyn CommandRunner>,
    pub store: Arc<dyn Store>,
    pub timeout: Duration,
    /// Recorded as creator of incidents opened by automation
    pub system_actor: String,
}

/// First non-blank string under any of `keys`
fn string_param<'a>(config: &'a JsonMap, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| config.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn service_name(config: &JsonMap) -> Result<&str> {
    string_param(config, &["service_name", "serviceName"]).ok_or(AiopsError::MissingParameter {
        param: "service_name",
        what: "Service name",
    })
}

pub fn script_path(config: &JsonMap) -> Result<&str> {
    string_param(config, &["script_path", "scriptPath"]).ok_or(AiopsError::MissingParameter {
        param: "script_path",
        what: "Script path",
    })
}

/// External resource an action touches, for serializing conflicting runs
pub fn resource_key(action: ActionType, config: &JsonMap) -> Option<String> {
    match action {
        ActionType::RestartService => service_name(config).ok().map(|s| format!("service:{s}")),
        ActionType::RunScript => script_path(config).ok().map(|p| format!("script:{p}")),
        ActionType::ScaleResources | ActionType::SendNotification | ActionType::CreateTicket => {
            None
        }
    }
}

/// Run the handler for `action`, returning its success payload
pub async fn perform(
    action: ActionType,
    rule: &AutomationRule,
    ctx: &ActionContext,
) -> Result<Value> {
    let config = &rule.action_config;
    match action {
        ActionType::RestartService => restart_service(config, ctx).await,
        ActionType::ScaleResources => Ok(json!({
            "success": true,
            "message": "Resource scaling triggered",
        })),
        ActionType::SendNotification => Ok(json!({
            "success": true,
            "message": "Notification sent",
        })),
        ActionType::RunScript => run_script(config, ctx).await,
        ActionType::CreateTicket => create_ticket(rule, ctx).await,
    }
}

async fn restart_service(config: &JsonMap, ctx: &ActionContext) -> Result<Value> {
    let service = service_name(config)?;
    let args = vec!["restart".to_string(), service.to_string()];
    let output = ctx.runner.run("systemctl", &args, ctx.timeout).await?;
    if !output.success {
        return Err(AiopsError::ActionFailed(format!(
            "Failed to restart service: {}",
            output.stderr.trim()
        )));
    }
    Ok(json!({
        "success": true,
        "service": service,
        "output": output.stdout,
    }))
}

async fn run_script(config: &JsonMap, ctx: &ActionContext) -> Result<Value> {
    let path = script_path(config)?;
    let output = ctx.runner.run(path, &[], ctx.timeout).await?;
    if !output.success {
        return Err(AiopsError::ActionFailed(format!(
            "Script execution failed: {}",
            output.stderr.trim()
        )));
    }
    Ok(json!({
        "success": true,
        "output": output.stdout,
    }))
}

async fn create_ticket(rule: &AutomationRule, ctx: &ActionContext) -> Result<Value> {
    let config = &rule.action_config;
    let title = string_param(config, &["title"]).unwrap_or(DEFAULT_TICKET_TITLE);
    let description = string_param(config, &["description"]).unwrap_or(DEFAULT_TICKET_DESCRIPTION);
    let now = Utc::now();

    let mut incident = Incident::new(
        title,
        description,
        IncidentPriority::Medium,
        ctx.system_actor.clone(),
        now,
    );
    if let Some(services) = ["affected_services", "affectedServices"]
        .iter()
        .find_map(|key| config.get(*key).and_then(Value::as_array))
    {
        incident.affected_services = services
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    let incident_id = incident.id;
    ctx.store.insert_incident(incident).await?;
    ctx.store
        .append_incident_log(IncidentLog::new(
            incident_id,
            format!("Incident created by automation rule '{}'", rule.name),
            ctx.system_actor.clone(),
            now,
        ))
        .await?;

    Ok(json!({
        "success": true,
        "incident_id": incident_id,
    }))
}

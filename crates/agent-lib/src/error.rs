//! Error taxonomy for the collection, scoring and automation loop
//!
//! Every variant maps onto one recovery policy: sensor errors skip a metric,
//! persistence errors fail the current cycle, action errors fail a single
//! execution and transition errors are rejected without touching state.

use crate::models::MetricKind;

/// Errors produced by the core components
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiopsError {
    /// A sensor read did not complete within its deadline
    #[error("sensor read for {kind} on {hostname} timed out after {timeout_ms}ms")]
    SensorTimeout {
        hostname: String,
        kind: MetricKind,
        timeout_ms: u64,
    },

    /// A sensor read failed outright
    #[error("sensor read for {kind} on {hostname} failed: {reason}")]
    SensorUnavailable {
        hostname: String,
        kind: MetricKind,
        reason: String,
    },

    /// The store rejected or could not complete a write or read
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// An action's configuration lacks a required key
    #[error("{what} not specified (missing '{param}')")]
    MissingParameter {
        param: &'static str,
        what: &'static str,
    },

    /// An external command exited non-zero or could not be run
    #[error("{0}")]
    ActionFailed(String),

    /// A rule names an action outside the known set
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// A status change that skips or reverses the lifecycle
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Settings or rule conditions that cannot be interpreted
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AiopsError {
    /// Short stable label used for metrics and structured logs
    pub fn code(&self) -> &'static str {
        match self {
            AiopsError::SensorTimeout { .. } => "sensor_timeout",
            AiopsError::SensorUnavailable { .. } => "sensor_unavailable",
            AiopsError::PersistenceFailure(_) => "persistence_failure",
            AiopsError::MissingParameter { .. } => "missing_parameter",
            AiopsError::ActionFailed(_) => "action_failed",
            AiopsError::UnknownActionType(_) => "unknown_action_type",
            AiopsError::InvalidTransition { .. } => "invalid_transition",
            AiopsError::NotFound { .. } => "not_found",
            AiopsError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Whether the next scheduled cycle may succeed without operator action
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AiopsError::SensorTimeout { .. }
                | AiopsError::SensorUnavailable { .. }
                | AiopsError::PersistenceFailure(_)
        )
    }
}

impl From<serde_json::Error> for AiopsError {
    fn from(err: serde_json::Error) -> Self {
        AiopsError::PersistenceFailure(format!("serialization error: {err}"))
    }
}

impl From<config::ConfigError> for AiopsError {
    fn from(err: config::ConfigError) -> Self {
        AiopsError::InvalidConfig(err.to_string())
    }
}

/// Convenience `Result` alias for core operations
pub type Result<T> = std::result::Result<T, AiopsError>;

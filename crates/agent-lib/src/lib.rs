//! Core library for the AIOps automation loop
//!
//! This crate provides the core functionality for:
//! - Host metric collection with static thresholds
//! - Statistical anomaly scoring
//! - Alert lifecycle management
//! - Rule-driven remediation with an audit trail
//! - Read-only queries, analytics, health checks and observability

pub mod alerts;
pub mod analytics;
pub mod anomaly;
pub mod automation;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod query;
pub mod settings;
pub mod store;

pub use alerts::AlertManager;
pub use error::{AiopsError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AiopsMetrics, StructuredLogger};
pub use orchestrator::{CycleReport, Orchestrator, OrchestratorConfig};
pub use settings::Settings;
pub use store::{MemoryStore, Store};

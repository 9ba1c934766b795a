//! AIOps agent - long-running collection and remediation loop
//!
//! Samples every configured host on a fixed interval, scores the recent
//! window for anomalies, fires automation rules, and serves the read-only
//! API alongside health and Prometheus endpoints.

use aiops_lib::{
    automation::sync_rules,
    health::HealthRegistry,
    observability::{AiopsMetrics, StructuredLogger},
    MemoryStore, Orchestrator, Store,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting aiops-agent");

    let settings = config::load()?;
    info!(hosts = ?settings.hosts, api_port = settings.api_port, "Agent configured");

    let store: Arc<dyn Store> = match &settings.state_file {
        Some(path) => Arc::new(
            MemoryStore::with_persistence(path)
                .await
                .with_context(|| format!("failed to open state file {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let loaded = sync_rules(store.as_ref(), settings.rules())
        .await
        .context("failed to load automation rules")?;
    info!(rules = loaded, "Automation rules synchronized");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    // Register metrics before the first scrape
    let _metrics = AiopsMetrics::new();

    let logger = StructuredLogger::new("aiops-agent");
    logger.log_startup(AGENT_VERSION, &settings.hosts);

    let orchestrator = Orchestrator::builder()
        .store(store.clone())
        .health(health_registry.clone())
        .logger(logger.clone())
        .config(settings.orchestrator_config())
        .collector_config(settings.collector_config()?)
        .anomaly_config(settings.anomaly_config()?)
        .rule_engine_config(settings.rule_engine_config()?)
        .executor_config(settings.executor_config())
        .build()
        .context("failed to assemble orchestrator")?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handle = tokio::spawn(orchestrator.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), store.clone()));
    let api_handle = tokio::spawn(api::serve(
        settings.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Orchestrator task panicked");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server stopped with an error"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    store.flush().await.context("failed to flush state on shutdown")?;
    info!("Shutdown complete");

    Ok(())
}

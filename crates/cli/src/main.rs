//! AIOps CLI
//!
//! Runs one collection cycle on demand and reports on alerts, incidents,
//! automation rules and host health from local state.

mod commands;
mod output;
mod session;

use aiops_lib::AlertStatus;
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, collect, reports};
use session::Session;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// AIOps automation CLI
#[derive(Parser)]
#[command(name = "aiops")]
#[command(author, version, about = "CLI for the AIOps automation loop", long_about = None)]
pub struct Cli {
    /// Settings file (TOML); AIOPS_* environment variables still apply
    #[arg(long, env = "AIOPS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// JSON state file, overriding `state_file` from settings
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one collection cycle for a host
    Collect {
        /// Host to sample
        #[arg(long, default_value = "localhost")]
        hostname: String,

        /// Score the recent window for anomalies
        #[arg(long)]
        anomaly_detection: bool,

        /// Evaluate automation rules and run their actions
        #[arg(long)]
        automation: bool,
    },

    /// List alerts (open only unless --all)
    Alerts {
        #[arg(long)]
        all: bool,
    },

    /// Acknowledge an open alert
    Ack { id: String },

    /// Resolve an acknowledged alert
    Resolve { id: String },

    /// Close a resolved alert
    Close { id: String },

    /// Alert breakdown by severity, status and metric
    AlertStats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// List incidents
    Incidents,

    /// Dashboard summary counts
    Summary,

    /// Recent samples for a host, grouped by metric
    Metrics {
        #[arg(long, default_value = "localhost")]
        hostname: String,

        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Health score and metric trends for a host
    Health {
        #[arg(long, default_value = "localhost")]
        hostname: String,

        #[arg(long, default_value_t = 24)]
        hours: i64,

        /// Days of history used for trends
        #[arg(long, default_value_t = 7)]
        trend_days: i64,
    },

    /// List configured automation rules
    Rules,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for reports
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let session = Session::open(cli.config.as_deref(), cli.state_file.as_deref()).await?;
    let format = cli.format;

    match cli.command {
        Commands::Collect {
            hostname,
            anomaly_detection,
            automation,
        } => {
            let options = collect::CollectOptions {
                hostname,
                anomaly_detection,
                automation,
            };
            collect::run(&session, options, format).await?;
        }
        Commands::Alerts { all } => alerts::list(&session, all, format).await?,
        Commands::Ack { id } => {
            alerts::transition(&session, &id, AlertStatus::Acknowledged, format).await?
        }
        Commands::Resolve { id } => {
            alerts::transition(&session, &id, AlertStatus::Resolved, format).await?
        }
        Commands::Close { id } => {
            alerts::transition(&session, &id, AlertStatus::Closed, format).await?
        }
        Commands::AlertStats { days } => alerts::stats(&session, days, format).await?,
        Commands::Incidents => reports::incidents(&session, format).await?,
        Commands::Summary => reports::summary(&session, format).await?,
        Commands::Metrics { hostname, hours } => {
            reports::metrics(&session, &hostname, hours, format).await?
        }
        Commands::Health {
            hostname,
            hours,
            trend_days,
        } => reports::health(&session, &hostname, hours, trend_days, format).await?,
        Commands::Rules => reports::rules(&session, format).await?,
    }

    Ok(())
}

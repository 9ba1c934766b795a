//! One-shot collection cycle

use aiops_lib::{CycleReport, Orchestrator};
use anyhow::{Context, Result};
use serde_json::json;

use crate::output::{print_json, print_warning, OutputFormat};
use crate::session::Session;

pub struct CollectOptions {
    pub hostname: String,
    pub anomaly_detection: bool,
    pub automation: bool,
}

/// Run a single cycle for one host and report what it did
pub async fn run(session: &Session, options: CollectOptions, format: OutputFormat) -> Result<()> {
    let settings = &session.settings;
    let mut config = settings.orchestrator_config();
    config.hosts = vec![options.hostname.clone()];
    config.enable_anomaly_detection = options.anomaly_detection;
    config.enable_automation = options.automation;

    let orchestrator = Orchestrator::builder()
        .store(session.store.clone())
        .config(config)
        .collector_config(settings.collector_config()?)
        .anomaly_config(settings.anomaly_config()?)
        .rule_engine_config(settings.rule_engine_config()?)
        .executor_config(settings.executor_config())
        .build()?;

    let report = orchestrator
        .run_cycle()
        .await
        .context("collection cycle failed")?;
    session.persist().await?;

    match format {
        OutputFormat::Json => print_json(&report_json(&report, &options))?,
        OutputFormat::Table => print_report(&report, &options),
    }
    Ok(())
}

fn print_report(report: &CycleReport, options: &CollectOptions) {
    println!(
        "Collected {} metrics for {}",
        report.samples_collected, options.hostname
    );
    if !report.hosts_failed.is_empty() {
        print_warning("Sample batch could not be persisted; it will be retried next cycle");
    }
    if options.anomaly_detection {
        println!("Detected {} anomalies", report.anomalies_found);
    }
    if options.automation {
        println!(
            "Processed automation triggers (fired {}, succeeded {}, failed {})",
            report.rules_fired,
            report.executions_succeeded(),
            report.executions_failed()
        );
        if report.actions_skipped > 0 {
            print_warning(&format!(
                "{} actions skipped after the cycle budget ran out",
                report.actions_skipped
            ));
        }
    }
}

fn report_json(report: &CycleReport, options: &CollectOptions) -> serde_json::Value {
    json!({
        "hostname": options.hostname,
        "samples_collected": report.samples_collected,
        "hosts_failed": report.hosts_failed,
        "anomalies_found": report.anomalies_found,
        "rules_fired": report.rules_fired,
        "executions_succeeded": report.executions_succeeded(),
        "executions_failed": report.executions_failed(),
        "actions_skipped": report.actions_skipped,
        "duration_ms": report.duration.as_millis() as u64,
    })
}

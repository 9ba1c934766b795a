//! Metric collection from host sensors
//!
//! The collector reads current counters through a [`HostSensor`], stamps
//! them into [`MetricSample`]s, persists each host's readings as a single
//! batch and then applies the static threshold table to what it stored.

mod sensor;
mod thresholds;

#[cfg(test)]
mod tests;

pub use sensor::{HostSensor, SensorReading, SysinfoSensor};
pub use thresholds::{breach_severity, Thresholds, HIGH_SEVERITY_FACTOR};

use crate::alerts::AlertManager;
use crate::error::{AiopsError, Result};
use crate::models::{Alert, MetricKind, MetricSample};
use crate::observability::{AiopsMetrics, StructuredLogger};
use crate::store::Store;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Kinds read from every host on each cycle
pub const SAMPLED_KINDS: [MetricKind; 4] = [
    MetricKind::Cpu,
    MetricKind::Memory,
    MetricKind::Disk,
    MetricKind::Network,
];

/// Configuration for one collector instance
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Kinds read per host (default: cpu, memory, disk, network)
    pub kinds: Vec<MetricKind>,
    /// Deadline for a single sensor read (default: 2 seconds)
    pub sensor_timeout: Duration,
    /// Deadline for the batch write (default: 5 seconds)
    pub write_timeout: Duration,
    pub thresholds: Thresholds,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            kinds: SAMPLED_KINDS.to_vec(),
            sensor_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            thresholds: Thresholds::default(),
        }
    }
}

pub struct Collector {
    sensor: Arc<dyn HostSensor>,
    store: Arc<dyn Store>,
    alerts: AlertManager,
    config: CollectorConfig,
    metrics: AiopsMetrics,
    logger: StructuredLogger,
}

impl Collector {
    pub fn new(
        sensor: Arc<dyn HostSensor>,
        store: Arc<dyn Store>,
        alerts: AlertManager,
        config: CollectorConfig,
    ) -> Self {
        Self {
            sensor,
            store,
            alerts,
            config,
            metrics: AiopsMetrics::new(),
            logger: StructuredLogger::new("collector"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Read, persist and threshold-check the current counters of one host
    ///
    /// Sensor failures and timeouts only drop the affected kind. A failed
    /// batch write fails the whole call and nothing from this host is kept.
    pub async fn sample(&self, hostname: &str) -> Result<Vec<MetricSample>> {
        let reads = self
            .config
            .kinds
            .iter()
            .map(|&kind| self.read_one(hostname, kind));
        let readings = join_all(reads).await;

        // One timestamp per batch so all kinds of a cycle line up
        let timestamp = Utc::now();
        let samples: Vec<MetricSample> = readings
            .into_iter()
            .flatten()
            .map(|(kind, reading)| {
                MetricSample::new(hostname, kind, reading.value, reading.unit, timestamp)
                    .with_metadata(reading.metadata)
            })
            .collect();

        if samples.is_empty() {
            warn!(hostname = %hostname, "No sensor produced a reading this cycle");
            return Ok(samples);
        }

        match timeout(self.config.write_timeout, self.store.insert_samples(samples.clone())).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AiopsError::PersistenceFailure(format!(
                    "sample batch for {hostname} not written within {}ms",
                    self.config.write_timeout.as_millis()
                )))
            }
        }
        self.metrics.add_samples_collected(samples.len() as u64);
        debug!(hostname = %hostname, count = samples.len(), "Samples persisted");

        self.check_thresholds(&samples).await;
        Ok(samples)
    }

    async fn read_one(
        &self,
        hostname: &str,
        kind: MetricKind,
    ) -> Option<(MetricKind, SensorReading)> {
        let err = match timeout(self.config.sensor_timeout, self.sensor.read(hostname, kind)).await
        {
            Ok(Ok(reading)) => return Some((kind, reading)),
            Ok(Err(e)) => e,
            Err(_) => AiopsError::SensorTimeout {
                hostname: hostname.to_string(),
                kind,
                timeout_ms: self.config.sensor_timeout.as_millis() as u64,
            },
        };

        warn!(
            hostname = %hostname,
            metric_kind = %kind,
            error = %err,
            "Sensor read skipped for this cycle"
        );
        self.metrics.inc_sensor_failure(kind.as_str(), err.code());
        None
    }

    /// Open one alert per sample above its configured limit
    pub async fn check_thresholds(&self, samples: &[MetricSample]) -> Vec<Alert> {
        let mut opened = Vec::new();
        for spec in samples.iter().filter_map(|s| self.config.thresholds.evaluate(s)) {
            let hostname = spec.hostname.clone();
            let kind = spec.metric_kind;
            match self.alerts.open(spec).await {
                Ok(alert) => {
                    self.logger.log_threshold_breach(&alert);
                    self.metrics
                        .inc_alert_opened("threshold", alert.severity.as_str());
                    opened.push(alert);
                }
                Err(e) => {
                    warn!(
                        hostname = %hostname,
                        metric_kind = %kind,
                        error = %e,
                        "Failed to open threshold alert"
                    );
                }
            }
        }
        opened
    }
}

//! Per-host multivariate anomaly scoring

use super::isolation_forest::{label_outliers, ForestParams, DEFAULT_MAX_SAMPLES};
use super::scaler::StandardScaler;
use crate::alerts::AlertManager;
use crate::error::Result;
use crate::models::{MetricKind, MetricSample, NewAlert, Severity};
use crate::observability::{AiopsMetrics, StructuredLogger};
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Feature columns, in matrix order
pub const FEATURE_KINDS: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Memory, MetricKind::Disk];

/// Fewer aligned rows than this and no model is fitted
pub const MIN_ALIGNED_POINTS: usize = 2;

#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// How far back the scoring window reaches (default: 24 hours)
    pub window: Duration,
    pub contamination: f64,
    pub seed: u64,
    pub trees: usize,
    pub max_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
            contamination: 0.1,
            seed: 42,
            trees: 100,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

impl AnomalyConfig {
    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.trees,
            max_samples: self.max_samples,
            contamination: self.contamination,
            seed: self.seed,
        }
    }
}

/// Fits a fresh outlier model per host on every run; nothing is kept between runs
pub struct AnomalyScorer {
    store: Arc<dyn Store>,
    alerts: AlertManager,
    config: AnomalyConfig,
    metrics: AiopsMetrics,
    logger: StructuredLogger,
}

impl AnomalyScorer {
    pub fn new(store: Arc<dyn Store>, alerts: AlertManager, config: AnomalyConfig) -> Self {
        Self {
            store,
            alerts,
            config,
            metrics: AiopsMetrics::new(),
            logger: StructuredLogger::new("anomaly_scorer"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// The cpu/memory/disk samples of `hostname` in the window ending at `until`
    pub async fn load_window(
        &self,
        hostname: &str,
        until: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>> {
        self.store
            .samples_between(hostname, &FEATURE_KINDS, until - self.config.window, until)
            .await
    }

    /// Samples of `hostname` flagged as anomalous, in window order
    ///
    /// Feature rows pair the i-th cpu, memory and disk readings, truncated to
    /// the shortest series. Row `i` being an outlier flags the i-th sample of
    /// the time-ordered window.
    pub fn detect(&self, hostname: &str, window: &[MetricSample]) -> Vec<MetricSample> {
        let mut samples: Vec<&MetricSample> = window
            .iter()
            .filter(|s| s.hostname == hostname && FEATURE_KINDS.contains(&s.kind))
            .collect();
        samples.sort_by_key(|s| s.timestamp);

        let series: Vec<Vec<f64>> = FEATURE_KINDS
            .iter()
            .map(|kind| {
                samples
                    .iter()
                    .filter(|s| s.kind == *kind)
                    .map(|s| s.value)
                    .collect()
            })
            .collect();

        let aligned = series.iter().map(Vec::len).min().unwrap_or(0);
        if aligned < MIN_ALIGNED_POINTS {
            debug!(
                hostname = %hostname,
                aligned_points = aligned,
                "Not enough aligned samples to score"
            );
            return Vec::new();
        }

        let rows: Vec<Vec<f64>> = (0..aligned)
            .map(|i| series.iter().map(|column| column[i]).collect())
            .collect();
        let scaled = StandardScaler::fit_transform(&rows);
        let labels = label_outliers(&scaled, &self.config.forest_params());

        labels
            .iter()
            .zip(&samples)
            .filter(|(outlier, _)| **outlier)
            .map(|(_, sample)| (*sample).clone())
            .collect()
    }

    /// Score the current window of `hostname` and open one alert per flagged sample
    pub async fn run(&self, hostname: &str) -> Result<usize> {
        let window = self.load_window(hostname, Utc::now()).await?;
        let flagged = self.detect(hostname, &window);

        for sample in &flagged {
            let alert = self.alerts.open(anomaly_alert(sample)).await?;
            self.logger.log_anomaly(&alert);
            self.metrics.inc_alert_opened("anomaly", alert.severity.as_str());
        }
        self.metrics.add_anomalies_detected(flagged.len() as u64);
        Ok(flagged.len())
    }
}

/// Statistical alerts carry no fixed threshold
fn anomaly_alert(sample: &MetricSample) -> NewAlert {
    NewAlert {
        title: format!("Anomaly Detected: {}", sample.kind.as_str().to_uppercase()),
        description: format!(
            "Anomalous {} value {}{} detected on {}",
            sample.kind, sample.value, sample.unit, sample.hostname
        ),
        severity: Severity::Medium,
        hostname: sample.hostname.clone(),
        metric_kind: sample.kind,
        threshold_value: 0.0,
        current_value: sample.value,
    }
}

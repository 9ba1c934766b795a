//! Static per-metric thresholds evaluated inline after each sample

use crate::error::{AiopsError, Result};
use crate::models::{MetricKind, MetricSample, NewAlert, Severity};
use std::collections::BTreeMap;

/// A breach above `threshold * HIGH_SEVERITY_FACTOR` is raised as high severity
pub const HIGH_SEVERITY_FACTOR: f64 = 1.2;

/// Severity of a breach of `threshold` by `value`
pub fn breach_severity(value: f64, threshold: f64) -> Severity {
    if value > threshold * HIGH_SEVERITY_FACTOR {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Upper limits keyed by metric kind; kinds without an entry are never checked
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    limits: BTreeMap<MetricKind, f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new([
            (MetricKind::Cpu, 80.0),
            (MetricKind::Memory, 85.0),
            (MetricKind::Disk, 90.0),
        ])
    }
}

impl Thresholds {
    pub fn new(limits: impl IntoIterator<Item = (MetricKind, f64)>) -> Self {
        Self {
            limits: limits.into_iter().collect(),
        }
    }

    /// Parse a `{"cpu": 80.0, ...}` map as it appears in settings
    pub fn from_config(raw: &BTreeMap<String, f64>) -> Result<Self> {
        let mut limits = BTreeMap::new();
        for (key, &limit) in raw {
            if !limit.is_finite() {
                return Err(AiopsError::InvalidConfig(format!(
                    "threshold for '{key}' must be a finite number"
                )));
            }
            limits.insert(key.parse::<MetricKind>()?, limit);
        }
        Ok(Self { limits })
    }

    pub fn limit(&self, kind: MetricKind) -> Option<f64> {
        self.limits.get(&kind).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, f64)> + '_ {
        self.limits.iter().map(|(k, v)| (*k, *v))
    }

    /// The alert to open for `sample`, if it exceeds its limit
    pub fn evaluate(&self, sample: &MetricSample) -> Option<NewAlert> {
        let threshold = self.limit(sample.kind)?;
        if sample.value <= threshold {
            return None;
        }

        let label = sample.kind.as_str().to_uppercase();
        Some(NewAlert {
            title: format!("{label} Usage Alert"),
            description: format!(
                "{label} usage is {}{} on {}",
                sample.value, sample.unit, sample.hostname
            ),
            severity: breach_severity(sample.value, threshold),
            hostname: sample.hostname.clone(),
            metric_kind: sample.kind,
            threshold_value: threshold,
            current_value: sample.value,
        })
    }
}

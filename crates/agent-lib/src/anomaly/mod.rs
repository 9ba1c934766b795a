//! Anomaly detection over recent host metrics
//!
//! This module provides:
//! - Column standardization of cpu/memory/disk feature rows
//! - A seeded isolation forest refitted on every run
//! - The per-host scorer that turns flagged samples into alerts

mod isolation_forest;
mod scaler;
mod scorer;


pub use isolation_forest::{label_outliers, ForestParams, IsolationForest};
pub use scaler::StandardScaler;
pub use scorer::{AnomalyConfig, AnomalyScorer, FEATURE_KINDS, MIN_ALIGNED_POINTS};

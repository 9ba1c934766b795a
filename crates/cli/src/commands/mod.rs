//! CLI command implementations

pub mod alerts;
pub mod collect;
pub mod reports;

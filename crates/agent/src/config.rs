//! Agent configuration

use aiops_lib::Settings;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable naming an optional TOML settings file
pub const CONFIG_PATH_ENV: &str = "AIOPS_CONFIG";

/// Load settings from `$AIOPS_CONFIG` (if set) and `AIOPS_*` variables
pub fn load() -> Result<Settings> {
    let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    Settings::load(path.as_deref()).with_context(|| match &path {
        Some(p) => format!("failed to load settings from {}", p.display()),
        None => "failed to load settings from the environment".to_string(),
    })
}

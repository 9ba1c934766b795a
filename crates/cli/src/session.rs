//! Local state shared by every command
//!
//! The CLI talks to the store directly: settings decide where the JSON
//! snapshot lives, and configured rules are upserted before any command runs.

use aiops_lib::{automation::sync_rules, MemoryStore, Settings, Store};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub struct Session {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
}

impl Session {
    pub async fn open(config: Option<&Path>, state_file: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::load(config).with_context(|| match config {
            Some(p) => format!("failed to load settings from {}", p.display()),
            None => "failed to load settings".to_string(),
        })?;
        if let Some(path) = state_file {
            settings.state_file = Some(path.to_path_buf());
        }

        let store: Arc<dyn Store> = match &settings.state_file {
            Some(path) => Arc::new(
                MemoryStore::with_persistence(path)
                    .await
                    .with_context(|| format!("failed to open state file {}", path.display()))?,
            ),
            None => {
                debug!("No state file configured, state will not outlive this command");
                Arc::new(MemoryStore::new())
            }
        };

        sync_rules(store.as_ref(), settings.rules())
            .await
            .context("failed to load automation rules")?;

        Ok(Self { settings, store })
    }

    /// Write any changes back to the state file
    pub async fn persist(&self) -> Result<()> {
        self.store
            .flush()
            .await
            .context("failed to write state file")
    }
}

//! Alert lifecycle management
//!
//! Alerts are opened by the collector (threshold breaches) and the anomaly
//! scorer (statistical flags), and moved forward by operators or actions.
//! No deduplication happens on open: every breach is its own record.

use crate::error::Result;
use crate::models::{Alert, AlertStatus, NewAlert};
use crate::store::{AlertFilter, Store};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct AlertManager {
    store: Arc<dyn Store>,
}

impl AlertManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create and persist a new alert in status `open`
    pub async fn open(&self, spec: NewAlert) -> Result<Alert> {
        let alert = Alert::open(spec, Utc::now());
        self.store.insert_alert(alert.clone()).await?;
        debug!(alert_id = %alert.id, hostname = %alert.hostname, "Alert opened");
        Ok(alert)
    }

    /// Move an alert one step forward; anything else is rejected unchanged
    pub async fn transition(&self, id: Uuid, to: AlertStatus) -> Result<Alert> {
        self.store
            .update_alert(id, Box::new(move |alert| alert.transition(to, Utc::now())))
            .await
    }

    pub async fn acknowledge(&self, id: Uuid) -> Result<Alert> {
        self.transition(id, AlertStatus::Acknowledged).await
    }

    pub async fn resolve(&self, id: Uuid) -> Result<Alert> {
        self.transition(id, AlertStatus::Resolved).await
    }

    pub async fn close(&self, id: Uuid) -> Result<Alert> {
        self.transition(id, AlertStatus::Closed).await
    }

    pub async fn assign(&self, id: Uuid, assignee: impl Into<String>) -> Result<Alert> {
        let assignee = assignee.into();
        self.store
            .update_alert(
                id,
                Box::new(move |alert| {
                    alert.assigned_to = Some(assignee);
                    alert.updated_at = Utc::now();
                    Ok(())
                }),
            )
            .await
    }

    pub async fn open_alerts(&self) -> Result<Vec<Alert>> {
        self.store.list_alerts(&AlertFilter::open()).await
    }
}

//! Host sensors
//!
//! A sensor answers "what is the current value of this counter on this
//! host". The shipped implementation reads the local machine through
//! `sysinfo`; remote hosts plug in their own [`HostSensor`].

use crate::error::{AiopsError, Result};
use crate::models::MetricKind;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, Networks, System};

/// One raw reading, before it is stamped and persisted
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub value: f64,
    pub unit: String,
    pub metadata: BTreeMap<String, Value>,
}

impl SensorReading {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Capability to read current counters for a host
#[async_trait]
pub trait HostSensor: Send + Sync {
    async fn read(&self, hostname: &str, kind: MetricKind) -> Result<SensorReading>;
}

/// Sensor backed by `sysinfo` for the machine the agent runs on
///
/// The hostname is only used as a label; every host name resolves to the
/// local counters.
pub struct SysinfoSensor {
    system: Arc<Mutex<System>>,
}

impl Default for SysinfoSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSensor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }

    fn read_blocking(
        system: &Mutex<System>,
        kind: MetricKind,
    ) -> std::result::Result<SensorReading, String> {
        match kind {
            MetricKind::Cpu => {
                let mut system = system.lock().unwrap_or_else(|p| p.into_inner());
                // Usage is a delta between two refreshes
                system.refresh_cpu();
                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
                system.refresh_cpu();
                Ok(SensorReading::new(
                    system.global_cpu_info().cpu_usage() as f64,
                    "%",
                ))
            }
            MetricKind::Memory => {
                let mut system = system.lock().unwrap_or_else(|p| p.into_inner());
                system.refresh_memory();
                let total = system.total_memory();
                if total == 0 {
                    return Err("total memory reported as zero".to_string());
                }
                let used = system.used_memory();
                Ok(SensorReading::new(used as f64 / total as f64 * 100.0, "%")
                    .with_meta("used_bytes", used)
                    .with_meta("total_bytes", total))
            }
            MetricKind::Disk => {
                let disks = Disks::new_with_refreshed_list();
                let root = disks
                    .iter()
                    .find(|d| d.mount_point() == Path::new("/"));

                let (total, available) = match root {
                    Some(disk) => (disk.total_space(), disk.available_space()),
                    None => disks.iter().fold((0u64, 0u64), |(t, a), d| {
                        (t + d.total_space(), a + d.available_space())
                    }),
                };
                if total == 0 {
                    return Err("no disk capacity reported".to_string());
                }
                let used = total.saturating_sub(available);
                Ok(SensorReading::new(used as f64 / total as f64 * 100.0, "%")
                    .with_meta("used_bytes", used)
                    .with_meta("total_bytes", total))
            }
            MetricKind::Network => {
                let networks = Networks::new_with_refreshed_list();
                let (received, sent) = networks.iter().fold((0u64, 0u64), |(r, s), (_, data)| {
                    (r + data.total_received(), s + data.total_transmitted())
                });
                Ok(SensorReading::new((received + sent) as f64, "bytes")
                    .with_meta("bytes_sent", sent)
                    .with_meta("bytes_recv", received))
            }
            other => Err(format!("{other} is not available from local system counters")),
        }
    }
}

#[async_trait]
impl HostSensor for SysinfoSensor {
    async fn read(&self, hostname: &str, kind: MetricKind) -> Result<SensorReading> {
        let system = Arc::clone(&self.system);
        let reading = tokio::task::spawn_blocking(move || Self::read_blocking(&system, kind))
            .await
            .map_err(|e| AiopsError::SensorUnavailable {
                hostname: hostname.to_string(),
                kind,
                reason: format!("sensor task failed: {e}"),
            })?;

        reading.map_err(|reason| AiopsError::SensorUnavailable {
            hostname: hostname.to_string(),
            kind,
            reason,
        })
    }
}

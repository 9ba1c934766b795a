//! Collector tests driven by scripted sensors
//!
//! These tests exercise sampling, batch persistence and threshold alerts
//! without touching real system counters.

#[cfg(test)]
mod scripted_sensor_tests {
    use crate::alerts::AlertManager;
    use crate::collector::{Collector, CollectorConfig, HostSensor, SensorReading};
    use crate::error::{AiopsError, Result};
    use crate::models::{AlertStatus, MetricKind, Severity};
    use crate::store::{AlertFilter, MemoryStore, Store};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Scripted reading per kind; kinds without a script fail
    enum Script {
        Value(f64),
        Fail,
        Hang,
    }

    struct ScriptedSensor {
        script: HashMap<MetricKind, Script>,
    }

    impl ScriptedSensor {
        fn new(entries: Vec<(MetricKind, Script)>) -> Self {
            Self {
                script: entries.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl HostSensor for ScriptedSensor {
        async fn read(&self, hostname: &str, kind: MetricKind) -> Result<SensorReading> {
            match self.script.get(&kind) {
                Some(Script::Value(v)) => {
                    let unit = if kind == MetricKind::Network { "bytes" } else { "%" };
                    Ok(SensorReading::new(*v, unit))
                }
                Some(Script::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    unreachable!("read should have timed out")
                }
                Some(Script::Fail) | None => Err(AiopsError::SensorUnavailable {
                    hostname: hostname.to_string(),
                    kind,
                    reason: "scripted failure".to_string(),
                }),
            }
        }
    }

    fn collector(sensor: ScriptedSensor) -> (Collector, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = CollectorConfig {
            sensor_timeout: Duration::from_millis(50),
            ..CollectorConfig::default()
        };
        let collector = Collector::new(
            Arc::new(sensor),
            store.clone(),
            AlertManager::new(store.clone()),
            config,
        );
        (collector, store)
    }

    #[tokio::test]
    async fn test_sample_persists_all_kinds_in_one_batch() {
        let (collector, store) = collector(ScriptedSensor::new(vec![
            (MetricKind::Cpu, Script::Value(12.0)),
            (MetricKind::Memory, Script::Value(40.0)),
            (MetricKind::Disk, Script::Value(55.0)),
            (MetricKind::Network, Script::Value(1024.0)),
        ]));

        let samples = collector.sample("web1").await.unwrap();
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|s| s.timestamp == samples[0].timestamp));
        assert_eq!(store.sample_count(), 4);

        // Nothing above threshold
        let alerts = store.list_alerts(&AlertFilter::default()).await.unwrap();
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_and_failed_reads_are_skipped() {
        let (collector, store) = collector(ScriptedSensor::new(vec![
            (MetricKind::Cpu, Script::Hang),
            (MetricKind::Memory, Script::Value(40.0)),
            (MetricKind::Disk, Script::Fail),
            (MetricKind::Network, Script::Value(10.0)),
        ]));

        let samples = collector.sample("web1").await.unwrap();
        let kinds: Vec<MetricKind> = samples.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![MetricKind::Memory, MetricKind::Network]);
        assert_eq!(store.sample_count(), 2);
    }

    #[tokio::test]
    async fn test_no_readings_is_not_an_error() {
        let (collector, store) = collector(ScriptedSensor::new(vec![]));
        let samples = collector.sample("web1").await.unwrap();
        assert!(samples.is_empty());
        assert_eq!(store.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_batch_persists_nothing_and_opens_no_alerts() {
        let (collector, store) = collector(ScriptedSensor::new(vec![
            (MetricKind::Cpu, Script::Value(99.0)),
            (MetricKind::Memory, Script::Value(f64::NAN)),
        ]));

        let err = collector.sample("web1").await.unwrap_err();
        assert!(matches!(err, AiopsError::PersistenceFailure(_)));
        assert_eq!(store.sample_count(), 0);
        assert!(store
            .list_alerts(&AlertFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cpu_95_opens_one_medium_alert() {
        let (collector, store) = collector(ScriptedSensor::new(vec![
            (MetricKind::Cpu, Script::Value(95.0)),
            (MetricKind::Memory, Script::Value(20.0)),
        ]));

        collector.sample("web1").await.unwrap();

        let alerts = store.list_alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.threshold_value, 80.0);
        assert_eq!(alert.current_value, 95.0);
        assert_eq!(alert.hostname, "web1");
        assert_eq!(alert.metric_kind, MetricKind::Cpu);
    }

    #[tokio::test]
    async fn test_every_breach_is_its_own_alert() {
        let (collector, store) = collector(ScriptedSensor::new(vec![
            (MetricKind::Cpu, Script::Value(99.0)),
            (MetricKind::Memory, Script::Value(90.0)),
            (MetricKind::Disk, Script::Value(99.5)),
        ]));

        collector.sample("web1").await.unwrap();
        collector.sample("web1").await.unwrap();

        let alerts = store.list_alerts(&AlertFilter::open()).await.unwrap();
        assert_eq!(alerts.len(), 6);
        let high = alerts.iter().filter(|a| a.severity == Severity::High).count();
        // cpu 99 > 96 is high; memory 90 < 102 and disk 99.5 < 108 are medium
        assert_eq!(high, 2);
    }

    #[tokio::test]
    async fn test_samples_are_queryable_per_host() {
        let (collector, store) = collector(ScriptedSensor::new(vec![(
            MetricKind::Cpu,
            Script::Value(10.0),
        )]));

        collector.sample("web1").await.unwrap();
        collector.sample("web2").await.unwrap();

        let now = Utc::now();
        let web1 = store
            .samples_between("web1", &[], now - ChronoDuration::minutes(1), now)
            .await
            .unwrap();
        assert_eq!(web1.len(), 1);
        assert_eq!(web1[0].hostname, "web1");
    }
}

//! Experiment collector: periodic snapshots written as CSV rows.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, SecondsFormat};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ecoscale_metrics::SnapshotSource;
use ecoscale_orchestrator::{HpaStatus, Orchestrator};

use crate::record::MetricsRecord;
use crate::sink::CsvSink;

/// Polls telemetry and HPA status for a fixed set of services.
pub struct Collector<S, O> {
    source: S,
    orchestrator: O,
    services: Vec<String>,
    scenario: String,
    read_hpa: bool,
}

impl<S: SnapshotSource, O: Orchestrator> Collector<S, O> {
    pub fn new(source: S, orchestrator: O, services: Vec<String>, scenario: &str) -> Self {
        Self {
            source,
            orchestrator,
            services,
            scenario: scenario.to_string(),
            read_hpa: true,
        }
    }

    /// Leave the HPA columns empty instead of querying the cluster.
    pub fn without_hpa(mut self) -> Self {
        self.read_hpa = false;
        self
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    async fn hpa_status(&self) -> BTreeMap<String, HpaStatus> {
        if !self.read_hpa {
            return BTreeMap::new();
        }
        match self.orchestrator.hpa_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "could not read HPA status, recording none");
                BTreeMap::new()
            }
        }
    }

    /// One poll: a record per configured service, in configured order.
    pub async fn sample(&self, timestamp: &str) -> Vec<MetricsRecord> {
        let (set, hpas) = tokio::join!(self.source.snapshots(), self.hpa_status());
        self.services
            .iter()
            .map(|service| {
                MetricsRecord::new(
                    timestamp,
                    &self.scenario,
                    &set.for_service(service),
                    hpas.get(service),
                )
            })
            .collect()
    }

    /// Poll every `every` until `duration` has elapsed or shutdown is
    /// signalled, appending each poll to `sink`. Returns the number of polls.
    pub async fn run(
        &self,
        sink: &mut CsvSink,
        duration: Duration,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<usize> {
        info!(
            scenario = %self.scenario,
            duration_secs = duration.as_secs(),
            every_secs = every.as_secs(),
            path = %sink.path().display(),
            "collection started"
        );

        let deadline = Instant::now() + duration;
        let mut polls = 0;

        while Instant::now() < deadline && !*shutdown.borrow() {
            let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
            let records = self.sample(&timestamp).await;
            sink.write_batch(&records)?;
            polls += 1;
            debug!(%timestamp, rows = records.len(), "collected data point");

            tokio::select! {
                _ = tokio::time::sleep(every) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(
            scenario = %self.scenario,
            polls,
            rows = sink.rows(),
            path = %sink.path().display(),
            "collection finished"
        );
        Ok(polls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecoscale_metrics::SyntheticSource;
    use ecoscale_orchestrator::InMemoryOrchestrator;

    fn services() -> Vec<String> {
        vec!["s0".to_string(), "s1".to_string()]
    }

    #[tokio::test]
    async fn sample_covers_configured_services_with_hpa() {
        let orch = InMemoryOrchestrator::default();
        orch.set_hpa(
            "s1",
            HpaStatus {
                target_replicas: 3,
                current_replicas: 2,
                current_cpu_utilization: None,
            },
        );
        let collector = Collector::new(
            SyntheticSource::seeded(services(), 3),
            orch,
            services(),
            "hpa",
        );

        let rows = collector.sample("t0").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].service, "s0");
        assert!(!rows[0].hpa_enabled);
        assert!(rows[1].hpa_enabled);
        assert_eq!(rows[1].hpa_target_replicas, 3);
        assert!(rows.iter().all(|r| r.scenario == "hpa" && r.timestamp == "t0"));
    }

    #[tokio::test]
    async fn hpa_can_be_skipped() {
        let orch = InMemoryOrchestrator::default();
        orch.set_hpa("s0", HpaStatus::default());
        let collector = Collector::new(
            SyntheticSource::seeded(services(), 3),
            orch,
            services(),
            "baseline",
        )
        .without_hpa();

        let rows = collector.sample("t0").await;
        assert!(rows.iter().all(|r| !r.hpa_enabled));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let collector = Collector::new(
            SyntheticSource::seeded(services(), 1),
            InMemoryOrchestrator::default(),
            services(),
            "energy",
        );
        let mut sink = CsvSink::create(dir.path(), "energy", &Local::now()).unwrap();
        let (tx, rx) = watch::channel(false);

        let run = collector.run(
            &mut sink,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            rx,
        );
        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        let (polls, ()) = tokio::join!(run, stop);

        assert_eq!(polls.unwrap(), 1);
        assert_eq!(sink.rows(), 2);
    }
}

//! Metrics acquisition traits and the live telemetry source.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use ecoscale_core::{QueryError, QueryTemplates, ServiceSnapshot};

use crate::aggregator::{Aggregator, Signal};

/// One series of an instant-query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(labels: &[(&str, &str)], value: f64) -> Self {
        Self {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// Boxed future returned by [`MetricsSource::query`].
pub type QueryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Sample>, QueryError>> + Send + 'a>>;

/// Boxed future returned by [`SnapshotSource::snapshots`].
pub type SnapshotFuture<'a> = Pin<Box<dyn Future<Output = SnapshotSet> + Send + 'a>>;

/// A time-series backend that evaluates query expressions.
pub trait MetricsSource: Send + Sync {
    /// Evaluate `expression` at the current instant.
    fn query<'a>(&'a self, expression: &'a str) -> QueryFuture<'a>;
}

/// Per-service snapshots for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotSet {
    pub services: BTreeMap<String, ServiceSnapshot>,
    /// Signals whose query failed this tick.
    pub failed: Vec<Signal>,
}

impl SnapshotSet {
    /// Snapshot for `service_id`, or an all-zero one if no source reported it.
    pub fn for_service(&self, service_id: &str) -> ServiceSnapshot {
        self.services
            .get(service_id)
            .cloned()
            .unwrap_or_else(|| ServiceSnapshot::empty(service_id))
    }
}

/// Anything that can produce a tick's worth of service snapshots.
///
/// The control loop and the collector only see this trait, so the live
/// Prometheus path and the synthetic demo path are interchangeable.
pub trait SnapshotSource: Send + Sync {
    fn snapshots(&self) -> SnapshotFuture<'_>;

    /// Short name for logs ("prometheus", "synthetic").
    fn kind(&self) -> &'static str;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for Box<S> {
    fn snapshots(&self) -> SnapshotFuture<'_> {
        (**self).snapshots()
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

/// Live snapshots built from the six configured queries.
pub struct TelemetrySource<M> {
    backend: M,
    queries: QueryTemplates,
}

impl<M: MetricsSource> TelemetrySource<M> {
    pub fn new(backend: M, queries: QueryTemplates) -> Self {
        Self { backend, queries }
    }

    pub fn backend(&self) -> &M {
        &self.backend
    }

    async fn collect(&self) -> SnapshotSet {
        let q = &self.queries;
        let (replicas, power, rps, p95, p99, energy) = tokio::join!(
            self.backend.query(&q.replicas),
            self.backend.query(&q.power),
            self.backend.query(&q.rps),
            self.backend.query(&q.latency_p95),
            self.backend.query(&q.latency_p99),
            self.backend.query(&q.energy_total),
        );

        let mut aggregator = Aggregator::new();
        let mut failed = Vec::new();

        for (signal, result) in [
            (Signal::Replicas, replicas),
            (Signal::Power, power),
            (Signal::Rps, rps),
            (Signal::LatencyP95, p95),
            (Signal::LatencyP99, p99),
            (Signal::EnergyTotal, energy),
        ] {
            match result {
                Ok(samples) => {
                    debug!(signal = signal.name(), series = samples.len(), "query ok");
                    aggregator.ingest(signal, &samples);
                }
                Err(e) => {
                    warn!(
                        signal = signal.name(),
                        query = %signal.expression(q),
                        error = %e,
                        "telemetry query failed"
                    );
                    failed.push(signal);
                }
            }
        }

        SnapshotSet {
            services: aggregator.finish(),
            failed,
        }
    }
}

impl<M: MetricsSource> SnapshotSource for TelemetrySource<M> {
    fn snapshots(&self) -> SnapshotFuture<'_> {
        Box::pin(self.collect())
    }

    fn kind(&self) -> &'static str {
        "prometheus"
    }
}

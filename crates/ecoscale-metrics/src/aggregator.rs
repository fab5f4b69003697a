//! Joins the six differently keyed query results into per-service snapshots.
//!
//! Keying rules per signal:
//!
//! | signal        | service taken from                 | combine            |
//! |---------------|------------------------------------|--------------------|
//! | replicas      | `deployment` label                 | last sample wins   |
//! | power         | `pod_name` prefix, `mode=dynamic`  | sum of values > 0  |
//! | rps, p95, p99 | `kubernetes_service` label         | last sample wins   |
//! | energy total  | `pod_name` prefix                  | sum                |
//!
//! Non-finite values (`histogram_quantile` over empty buckets yields NaN)
//! are dropped as if the series were absent.

use std::collections::BTreeMap;

use ecoscale_core::{QueryTemplates, ServiceSnapshot, is_service_id, service_from_pod};

use crate::source::Sample;

const DEPLOYMENT_LABEL: &str = "deployment";
const SERVICE_LABEL: &str = "kubernetes_service";
const POD_LABEL: &str = "pod_name";
const MODE_LABEL: &str = "mode";
const DYNAMIC_MODE: &str = "dynamic";

/// The six raw signals queried every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Replicas,
    Power,
    Rps,
    LatencyP95,
    LatencyP99,
    EnergyTotal,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::Replicas,
        Signal::Power,
        Signal::Rps,
        Signal::LatencyP95,
        Signal::LatencyP99,
        Signal::EnergyTotal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Replicas => "replicas",
            Signal::Power => "power",
            Signal::Rps => "rps",
            Signal::LatencyP95 => "latency_p95",
            Signal::LatencyP99 => "latency_p99",
            Signal::EnergyTotal => "energy_total",
        }
    }

    /// The configured query expression for this signal.
    pub fn expression<'a>(&self, queries: &'a QueryTemplates) -> &'a str {
        match self {
            Signal::Replicas => &queries.replicas,
            Signal::Power => &queries.power,
            Signal::Rps => &queries.rps,
            Signal::LatencyP95 => &queries.latency_p95,
            Signal::LatencyP99 => &queries.latency_p99,
            Signal::EnergyTotal => &queries.energy_total,
        }
    }
}

/// Accumulates query results for one tick.
#[derive(Debug, Default)]
pub struct Aggregator {
    services: BTreeMap<String, ServiceSnapshot>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one signal's samples into the per-service map.
    pub fn ingest(&mut self, signal: Signal, samples: &[Sample]) {
        for sample in samples.iter().filter(|s| s.value.is_finite()) {
            match signal {
                Signal::Replicas => {
                    if let Some(id) = labelled_service(sample, DEPLOYMENT_LABEL) {
                        self.entry(id).replicas = sample.value.max(0.0) as u32;
                    }
                }
                Signal::Power => {
                    if sample.label(MODE_LABEL) != Some(DYNAMIC_MODE) || sample.value <= 0.0 {
                        continue;
                    }
                    if let Some(id) = pod_service(sample) {
                        self.entry(id).power_watts += sample.value;
                    }
                }
                Signal::Rps => {
                    if let Some(id) = labelled_service(sample, SERVICE_LABEL) {
                        self.entry(id).rps = sample.value.max(0.0);
                    }
                }
                Signal::LatencyP95 => {
                    if let Some(id) = labelled_service(sample, SERVICE_LABEL) {
                        self.entry(id).latency_p95_ms = sample.value.max(0.0);
                    }
                }
                Signal::LatencyP99 => {
                    if let Some(id) = labelled_service(sample, SERVICE_LABEL) {
                        self.entry(id).latency_p99_ms = sample.value.max(0.0);
                    }
                }
                Signal::EnergyTotal => {
                    if let Some(id) = pod_service(sample) {
                        self.entry(id).total_energy_joules += sample.value;
                    }
                }
            }
        }
    }

    /// Compute the derived metrics and hand out the snapshots.
    pub fn finish(mut self) -> BTreeMap<String, ServiceSnapshot> {
        for snapshot in self.services.values_mut() {
            snapshot.refresh_derived();
        }
        self.services
    }

    fn entry(&mut self, id: &str) -> &mut ServiceSnapshot {
        self.services
            .entry(id.to_string())
            .or_insert_with(|| ServiceSnapshot::empty(id))
    }
}

fn labelled_service<'a>(sample: &'a Sample, label: &str) -> Option<&'a str> {
    sample.label(label).filter(|id| is_service_id(id))
}

fn pod_service(sample: &Sample) -> Option<&str> {
    sample.label(POD_LABEL).and_then(service_from_pod)
}

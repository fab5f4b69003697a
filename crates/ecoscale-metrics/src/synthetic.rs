//! Synthetic snapshot source for demos and dry runs without telemetry.
//!
//! SYNTHETIC DATA. The numbers come from randomised placeholder formulas
//! (traffic proportional to an assumed replica count, power linear in
//! traffic). They do not measure anything and must not be read as energy
//! behaviour of a real workload.

use std::collections::BTreeMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ecoscale_core::ServiceSnapshot;

use crate::source::{SnapshotFuture, SnapshotSet, SnapshotSource};

const RPS_PER_REPLICA: f64 = 1.5;
const BASE_POWER_WATTS: f64 = 1.5;
const WATTS_PER_RPS: f64 = 0.3;
/// Seconds of power folded into the fake cumulative energy counter.
const ENERGY_WINDOW_SECS: f64 = 60.0;

/// Generates plausible-looking but fabricated snapshots.
pub struct SyntheticSource {
    services: Vec<String>,
    assumed_replicas: u32,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(services: Vec<String>) -> Self {
        Self::with_rng(services, StdRng::from_entropy())
    }

    /// Deterministic output for tests.
    pub fn seeded(services: Vec<String>, seed: u64) -> Self {
        Self::with_rng(services, StdRng::seed_from_u64(seed))
    }

    fn with_rng(services: Vec<String>, rng: StdRng) -> Self {
        Self {
            services,
            assumed_replicas: 1,
            rng: Mutex::new(rng),
        }
    }

    /// Replica count the traffic formula assumes for every service.
    pub fn with_assumed_replicas(mut self, replicas: u32) -> Self {
        self.assumed_replicas = replicas;
        self
    }

    fn generate(&self) -> SnapshotSet {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut services = BTreeMap::new();

        for id in &self.services {
            let mut snap = ServiceSnapshot::empty(id);
            snap.replicas = self.assumed_replicas;
            if self.assumed_replicas > 0 {
                let base = f64::from(self.assumed_replicas) * RPS_PER_REPLICA;
                snap.rps = (base + rng.gen_range(-0.5..1.0)).max(0.0);
            }
            snap.power_watts = BASE_POWER_WATTS + snap.rps * WATTS_PER_RPS;
            snap.latency_p95_ms = 100.0 + rng.gen_range(0.0..50.0);
            snap.latency_p99_ms = 150.0 + rng.gen_range(0.0..100.0);
            snap.total_energy_joules = snap.power_watts * ENERGY_WINDOW_SECS;
            snap.refresh_derived();
            services.insert(id.clone(), snap);
        }

        SnapshotSet {
            services,
            failed: Vec::new(),
        }
    }
}

impl SnapshotSource for SyntheticSource {
    fn snapshots(&self) -> SnapshotFuture<'_> {
        let set = self.generate();
        Box::pin(async move { set })
    }

    fn kind(&self) -> &'static str {
        "synthetic"
    }
}

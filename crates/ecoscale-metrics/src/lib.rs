//! ecoscale-metrics: telemetry acquisition for the energy-aware autoscaler.
//!
//! Runs the six per-tick PromQL queries, joins their differently keyed
//! results into one `ServiceSnapshot` per service, and derives EPR and
//! efficiency.
//!
//! # Architecture
//!
//! ```text
//! SnapshotSource (trait)
//!   ├── TelemetrySource<M: MetricsSource>
//!   │     ├── six queries, issued concurrently → Vec<Sample> | QueryError
//!   │     └── Aggregator → BTreeMap<service, ServiceSnapshot>
//!   └── SyntheticSource  (randomised demo data, never real energy)
//!
//! MetricsSource (trait)
//!   └── PromClient → GET /api/v1/query
//! ```
//!
//! A failed query only removes its own signal from the tick; the other
//! five still populate the snapshots.

pub mod aggregator;
pub mod client;
pub mod source;
pub mod synthetic;

pub use aggregator::{Aggregator, Signal};
pub use client::PromClient;
pub use source::{
    MetricsSource, QueryFuture, Sample, SnapshotFuture, SnapshotSet, SnapshotSource,
    TelemetrySource,
};
pub use synthetic::SyntheticSource;

//! ecoscale-orchestrator: the cluster side of the control loop.
//!
//! Reads the authoritative replica count of a deployment and applies
//! replica-count changes. The control loop never trusts a cached or
//! telemetry-reported count for its decisions; every tick asks the
//! orchestrator directly.
//!
//! # Implementations
//!
//! - **`Kubectl`**: shells out to `kubectl get/scale deployment`
//! - **`DryRunOrchestrator`**: reads through, logs writes without applying them
//! - **`InMemoryOrchestrator`**: process-local replica table for tests and demos
//!
//! There is no locking against other writers: a concurrent manual
//! `kubectl scale` races with the loop and the last write wins.

pub mod client;
pub mod kubectl;
pub mod memory;

pub use client::{DryRunOrchestrator, HpaStatus, Orchestrator};
pub use kubectl::Kubectl;
pub use memory::InMemoryOrchestrator;

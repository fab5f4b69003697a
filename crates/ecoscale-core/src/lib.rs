//! ecoscale-core: shared types for the energy-aware autoscaler.
//!
//! Holds the `ecoscale.toml` configuration model and its validation,
//! the per-service `ServiceSnapshot` with its derived EPR/efficiency
//! metrics, the `ScaleDecision` produced by the policy, and the error
//! taxonomy shared by every other crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ClusterConfig, EcoscaleConfig, QueryTemplates, ScalingConfig, TelemetryConfig,
    parse_duration,
};
pub use error::{ConfigError, QueryError, ReadError, ScaleError};
pub use types::*;

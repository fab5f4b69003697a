//! Error types shared across ecoscale crates.
//!
//! `QueryError`, `ReadError` and `ScaleError` are per-service and never
//! abort a tick. `ConfigError` is only raised at startup.

use std::time::Duration;

use thiserror::Error;

/// Telemetry backend failure for a single query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid telemetry url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("telemetry backend rejected query: {error_type}: {error}")]
    Rejected { error_type: String, error: String },

    #[error("malformed response: {0}")]
    Parse(String),
}

/// Failure to read a service's current replica count.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("deployment {service} not found: {reason}")]
    NotFound { service: String, reason: String },

    #[error("orchestrator unreachable reading {service}: {reason}")]
    Unreachable { service: String, reason: String },

    #[error("reading replicas of {service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("unparseable replica count for {service}: {output:?}")]
    Parse { service: String, output: String },
}

/// Failure to apply a replica-count mutation.
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("scaling {service} to {target} rejected: {reason}")]
    Rejected {
        service: String,
        target: u32,
        reason: String,
    },

    #[error("orchestrator unreachable scaling {service}: {reason}")]
    Unreachable { service: String, reason: String },

    #[error("scaling {service} timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },
}

/// Invalid startup configuration. Fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("min_replicas ({min}) exceeds max_replicas ({max})")]
    InvalidBounds { min: u32, max: u32 },

    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("no services configured")]
    NoServices,

    #[error("invalid service id {0:?}: expected s<digits>")]
    InvalidServiceId(String),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid telemetry url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

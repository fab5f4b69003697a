//! ecoscale.toml configuration parser.
//!
//! Every field has a default matching the reference deployment, so an
//! empty file (or no file at all) yields a usable configuration.
//! `validate()` must pass before the control loop starts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::types::is_service_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoscaleConfig {
    /// Services under control, evaluated in this order every tick.
    pub services: Vec<String>,
    pub telemetry: TelemetryConfig,
    pub cluster: ClusterConfig,
    pub scaling: ScalingConfig,
    pub queries: QueryTemplates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Base URL of the Prometheus HTTP API.
    pub url: String,
    /// Per-query timeout.
    pub timeout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub namespace: String,
    /// kubectl binary, resolved through `$PATH` unless absolute.
    pub kubectl: String,
    /// Per-invocation timeout.
    pub timeout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Sleep between ticks.
    pub interval: String,
    /// Scale up when efficiency falls below this (RPS/W).
    pub low_efficiency_threshold: f64,
    /// Scale down when efficiency exceeds this (RPS/W) and traffic is low.
    pub high_efficiency_threshold: f64,
    /// Scale down only while RPS stays below this.
    pub rps_scale_down_threshold: f64,
    pub min_replicas: u32,
    pub max_replicas: u32,
}

/// PromQL expressions for the six signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTemplates {
    pub replicas: String,
    pub power: String,
    pub rps: String,
    pub latency_p95: String,
    pub latency_p99: String,
    pub energy_total: String,
}

impl Default for EcoscaleConfig {
    fn default() -> Self {
        Self {
            services: (0..10).map(|i| format!("s{i}")).collect(),
            telemetry: TelemetryConfig::default(),
            cluster: ClusterConfig::default(),
            scaling: ScalingConfig::default(),
            queries: QueryTemplates::default(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.49.2:30000".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            kubectl: "kubectl".to_string(),
            timeout: "30s".to_string(),
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            low_efficiency_threshold: 0.25,
            high_efficiency_threshold: 0.35,
            rps_scale_down_threshold: 2.0,
            min_replicas: 1,
            max_replicas: 5,
        }
    }
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self {
            replicas: r#"kube_deployment_status_replicas{deployment=~"s[0-9]+"}"#.to_string(),
            power: r#"rate(kepler_container_joules_total{container_namespace="default"}[5m])"#
                .to_string(),
            rps: r#"rate(mub_request_processing_latency_milliseconds_count{kubernetes_service=~"s[0-9]+"}[5m])"#
                .to_string(),
            latency_p95: r#"histogram_quantile(0.95, rate(mub_request_processing_latency_milliseconds_bucket{kubernetes_service=~"s[0-9]+"}[5m]))"#
                .to_string(),
            latency_p99: r#"histogram_quantile(0.99, rate(mub_request_processing_latency_milliseconds_bucket{kubernetes_service=~"s[0-9]+"}[5m]))"#
                .to_string(),
            energy_total: r#"kepler_container_joules_total{container_namespace="default"}"#
                .to_string(),
        }
    }
}

impl EcoscaleConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` (or defaults) and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check bounds, thresholds, service ids, durations and the telemetry URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scaling;
        if s.min_replicas > s.max_replicas {
            return Err(ConfigError::InvalidBounds {
                min: s.min_replicas,
                max: s.max_replicas,
            });
        }

        for (name, value) in [
            ("low_efficiency_threshold", s.low_efficiency_threshold),
            ("high_efficiency_threshold", s.high_efficiency_threshold),
            ("rps_scale_down_threshold", s.rps_scale_down_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if s.low_efficiency_threshold >= s.high_efficiency_threshold {
            warn!(
                low = s.low_efficiency_threshold,
                high = s.high_efficiency_threshold,
                "low efficiency threshold is not below the high threshold; scale-up takes precedence"
            );
        }

        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }
        if let Some(bad) = self.services.iter().find(|id| !is_service_id(id)) {
            return Err(ConfigError::InvalidServiceId(bad.clone()));
        }

        for (field, value) in [
            ("scaling.interval", &s.interval),
            ("telemetry.timeout", &self.telemetry.timeout),
            ("cluster.timeout", &self.cluster.timeout),
        ] {
            match parse_duration(value) {
                Some(d) if !d.is_zero() => {}
                _ => {
                    return Err(ConfigError::InvalidDuration {
                        field,
                        value: value.clone(),
                    });
                }
            }
        }

        validate_http_url(&self.telemetry.url)?;

        if self.cluster.namespace.trim().is_empty() {
            return Err(ConfigError::Empty("cluster.namespace"));
        }
        if self.cluster.kubectl.trim().is_empty() {
            return Err(ConfigError::Empty("cluster.kubectl"));
        }

        let q = &self.queries;
        for (field, expr) in [
            ("queries.replicas", &q.replicas),
            ("queries.power", &q.power),
            ("queries.rps", &q.rps),
            ("queries.latency_p95", &q.latency_p95),
            ("queries.latency_p99", &q.latency_p99),
            ("queries.energy_total", &q.energy_total),
        ] {
            if expr.trim().is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }

        Ok(())
    }
}

impl ScalingConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(60))
    }
}

impl TelemetryConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(10))
    }
}

impl ClusterConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

fn validate_http_url(url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    let uri: http::Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only http:// is supported"));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "1m", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

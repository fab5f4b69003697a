//! Shared types used across ecoscale crates.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Service identifiers follow the `s<digits>` naming convention.
static SERVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^s[0-9]+$").expect("static regex"));

/// Leading service prefix of a pod/instance name (`s6-75bfb5dffb-q5trn` → `s6`).
static SERVICE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(s[0-9]+)").expect("static regex"));

/// Returns true if `id` is a well-formed service identifier.
pub fn is_service_id(id: &str) -> bool {
    SERVICE_ID.is_match(id)
}

/// Extract the service id from a pod name by its leading `s[0-9]+` prefix.
pub fn service_from_pod(pod_name: &str) -> Option<&str> {
    SERVICE_PREFIX
        .captures(pod_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Joules per request. Zero unless both power and traffic are positive.
pub fn energy_per_request(power_watts: f64, rps: f64) -> f64 {
    if rps > 0.0 && power_watts > 0.0 {
        power_watts / rps
    } else {
        0.0
    }
}

/// Requests per watt. Zero when no power is reported.
pub fn efficiency(power_watts: f64, rps: f64) -> f64 {
    if power_watts > 0.0 {
        rps / power_watts
    } else {
        0.0
    }
}

/// One service's telemetry for a single tick.
///
/// Built fresh from live queries every tick and dropped at the end of it.
/// Raw signals that were not reported default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service_id: String,
    pub replicas: u32,
    pub power_watts: f64,
    pub rps: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub total_energy_joules: f64,
    pub epr_joules_per_request: f64,
    pub efficiency_rps_per_watt: f64,
}

impl ServiceSnapshot {
    /// A snapshot with every signal at zero.
    pub fn empty(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            replicas: 0,
            power_watts: 0.0,
            rps: 0.0,
            latency_p95_ms: 0.0,
            latency_p99_ms: 0.0,
            total_energy_joules: 0.0,
            epr_joules_per_request: 0.0,
            efficiency_rps_per_watt: 0.0,
        }
    }

    /// Recompute EPR and efficiency from the raw power and rps fields.
    pub fn refresh_derived(&mut self) {
        self.epr_joules_per_request = energy_per_request(self.power_watts, self.rps);
        self.efficiency_rps_per_watt = efficiency(self.power_watts, self.rps);
    }

    /// EPR in millijoules, as shown in summaries.
    pub fn epr_millijoules(&self) -> f64 {
        self.epr_joules_per_request * 1000.0
    }
}

/// Outcome of evaluating the scaling policy for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ScaleDecision {
    /// Add one replica; carries the new count.
    ScaleUp(u32),
    /// Remove one replica; carries the new count.
    ScaleDown(u32),
    NoChange,
}

impl ScaleDecision {
    /// Target replica count, if the decision changes anything.
    pub fn target(&self) -> Option<u32> {
        match self {
            ScaleDecision::ScaleUp(n) | ScaleDecision::ScaleDown(n) => Some(*n),
            ScaleDecision::NoChange => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScaleDecision::ScaleUp(_) => "scale_up",
            ScaleDecision::ScaleDown(_) => "scale_down",
            ScaleDecision::NoChange => "no_change",
        }
    }
}

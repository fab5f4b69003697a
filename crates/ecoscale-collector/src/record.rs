//! One CSV row: a service's snapshot at one poll, plus its HPA status.

use serde::{Deserialize, Serialize};

use ecoscale_core::ServiceSnapshot;
use ecoscale_orchestrator::HpaStatus;

/// Column order is the field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// RFC 3339 time of the poll.
    pub timestamp: String,
    pub service: String,
    pub scenario: String,
    pub replicas: u32,
    pub rps: f64,
    pub power_watts: f64,
    pub epr_joules_per_request: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub efficiency_rps_per_watt: f64,
    pub total_energy_joules: f64,
    pub hpa_enabled: bool,
    pub hpa_target_replicas: u32,
    pub hpa_current_replicas: u32,
}

impl MetricsRecord {
    pub fn new(
        timestamp: &str,
        scenario: &str,
        snapshot: &ServiceSnapshot,
        hpa: Option<&HpaStatus>,
    ) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            service: snapshot.service_id.clone(),
            scenario: scenario.to_string(),
            replicas: snapshot.replicas,
            rps: snapshot.rps,
            power_watts: snapshot.power_watts,
            epr_joules_per_request: snapshot.epr_joules_per_request,
            latency_p95_ms: snapshot.latency_p95_ms,
            latency_p99_ms: snapshot.latency_p99_ms,
            efficiency_rps_per_watt: snapshot.efficiency_rps_per_watt,
            total_energy_joules: snapshot.total_energy_joules,
            hpa_enabled: hpa.is_some(),
            hpa_target_replicas: hpa.map_or(0, |h| h.target_replicas),
            hpa_current_replicas: hpa.map_or(0, |h| h.current_replicas),
        }
    }
}

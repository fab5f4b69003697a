//! The scaling policy: a pure function of the observed metrics, the
//! current replica count and the configured thresholds.

use tracing::debug;

use ecoscale_core::{ScaleDecision, ScalingConfig, ServiceSnapshot};

/// Replica bounds and efficiency thresholds, fixed for the life of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Below this many requests per watt the service is under-provisioned.
    pub low_efficiency_threshold: f64,
    /// Above this many requests per watt the service may shed a replica.
    pub high_efficiency_threshold: f64,
    /// Scale-down only happens while traffic is below this rate.
    pub rps_scale_down_threshold: f64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::from(&ScalingConfig::default())
    }
}

impl From<&ScalingConfig> for ScalingPolicy {
    fn from(config: &ScalingConfig) -> Self {
        Self {
            min_replicas: config.min_replicas,
            max_replicas: config.max_replicas,
            low_efficiency_threshold: config.low_efficiency_threshold,
            high_efficiency_threshold: config.high_efficiency_threshold,
            rps_scale_down_threshold: config.rps_scale_down_threshold,
        }
    }
}

impl ScalingPolicy {
    /// Decide the next replica count. Rules are checked in order and the
    /// first match wins. A replica count already outside `[min, max]` only
    /// moves when a rule fires; see [`ScalingPolicy::bound`].
    pub fn evaluate(&self, efficiency: f64, rps: f64, current: u32) -> ScaleDecision {
        if efficiency < self.low_efficiency_threshold && current < self.max_replicas {
            return ScaleDecision::ScaleUp(current + 1);
        }

        if efficiency > self.high_efficiency_threshold
            && rps < self.rps_scale_down_threshold
            && current > self.min_replicas
        {
            return ScaleDecision::ScaleDown(current - 1);
        }

        ScaleDecision::NoChange
    }

    /// Pull a replica count into `[min_replicas, max_replicas]`. Applied to
    /// every target before it is written.
    pub fn bound(&self, replicas: u32) -> u32 {
        replicas.max(self.min_replicas).min(self.max_replicas)
    }

    /// Evaluate `snapshot` at `current` replicas.
    pub fn decide(&self, snapshot: &ServiceSnapshot, current: u32) -> ScaleDecision {
        let decision = self.evaluate(snapshot.efficiency_rps_per_watt, snapshot.rps, current);
        debug!(
            service = %snapshot.service_id,
            efficiency = snapshot.efficiency_rps_per_watt,
            rps = snapshot.rps,
            current,
            low = self.low_efficiency_threshold,
            high = self.high_efficiency_threshold,
            decision = decision.kind(),
            "policy evaluated"
        );
        decision
    }
}

//! Autoscaler: the periodic evaluate-and-apply loop.
//!
//! Each tick fetches one snapshot set, then evaluates the configured
//! services strictly in order. Nothing is carried between ticks: no
//! cooldowns, no cached replica counts.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use ecoscale_core::{ScaleDecision, ServiceSnapshot};
use ecoscale_metrics::{SnapshotSet, SnapshotSource};
use ecoscale_orchestrator::Orchestrator;

use crate::policy::ScalingPolicy;

/// Replica count assumed for a service whose read failed this tick. A
/// policy floor above it takes precedence.
pub const ASSUMED_REPLICAS_ON_READ_ERROR: u32 = 1;

/// What happened to the decision of one service.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleAction {
    /// Nothing to apply.
    Unchanged,
    /// The orchestrator accepted the new count.
    Applied { from: u32, to: u32 },
    /// The orchestrator only logged the new count.
    DryRun { from: u32, to: u32 },
    /// The orchestrator rejected or could not be reached; the next tick retries.
    Failed { target: u32, error: String },
}

/// Result of evaluating one service in one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleOutcome {
    /// Telemetry for the service; `replicas` holds the count the policy saw.
    pub snapshot: ServiceSnapshot,
    pub decision: ScaleDecision,
    /// The replica read failed and the default was used.
    pub replicas_assumed: bool,
    pub action: ScaleAction,
}

impl ScaleAction {
    pub fn kind(&self) -> &'static str {
        match self {
            ScaleAction::Unchanged => "unchanged",
            ScaleAction::Applied { .. } => "applied",
            ScaleAction::DryRun { .. } => "dry_run",
            ScaleAction::Failed { .. } => "failed",
        }
    }
}

impl ScaleOutcome {
    pub fn service(&self) -> &str {
        &self.snapshot.service_id
    }

    /// Replica count after the action, as far as this tick knows.
    pub fn resulting_replicas(&self) -> u32 {
        match self.action {
            ScaleAction::Applied { to, .. } => to,
            _ => self.snapshot.replicas,
        }
    }
}

/// Evaluates the policy for every configured service and applies the
/// decisions through the orchestrator.
pub struct Autoscaler<S, O> {
    source: S,
    orchestrator: O,
    services: Vec<String>,
    policy: ScalingPolicy,
}

impl<S: SnapshotSource, O: Orchestrator> Autoscaler<S, O> {
    pub fn new(source: S, orchestrator: O, services: Vec<String>, policy: ScalingPolicy) -> Self {
        Self {
            source,
            orchestrator,
            services,
            policy,
        }
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Run one evaluation cycle across all configured services.
    pub async fn tick(&self) -> Vec<ScaleOutcome> {
        let set = self.source.snapshots().await;
        if !set.failed.is_empty() {
            debug!(
                failed = ?set.failed,
                source = self.source.kind(),
                "tick proceeds with partial telemetry"
            );
        }

        let mut outcomes = Vec::with_capacity(self.services.len());
        for service in &self.services {
            outcomes.push(self.evaluate_service(service, &set).await);
        }
        outcomes
    }

    async fn evaluate_service(&self, service: &str, set: &SnapshotSet) -> ScaleOutcome {
        let mut snapshot = set.for_service(service);

        let (current, replicas_assumed) = match self.orchestrator.get_replicas(service).await {
            Ok(n) => (n, false),
            Err(e) => {
                let assumed = ASSUMED_REPLICAS_ON_READ_ERROR.max(self.policy.min_replicas);
                warn!(
                    service,
                    error = %e,
                    assumed,
                    "replica read failed, assuming default for this tick"
                );
                (assumed, true)
            }
        };
        snapshot.replicas = current;

        let decision = self.policy.decide(&snapshot, current);

        // Whatever count gets written stays within the configured bounds.
        let target = decision.target().map(|t| self.policy.bound(t));
        let action = match target {
            Some(target) if target != current => {
                match self.orchestrator.set_replicas(service, target).await {
                    Ok(()) if self.orchestrator.applies_writes() => ScaleAction::Applied {
                        from: current,
                        to: target,
                    },
                    Ok(()) => ScaleAction::DryRun {
                        from: current,
                        to: target,
                    },
                    Err(e) => {
                        warn!(service, target, error = %e, "scaling action failed");
                        ScaleAction::Failed {
                            target,
                            error: e.to_string(),
                        }
                    }
                }
            }
            _ => ScaleAction::Unchanged,
        };

        let outcome = ScaleOutcome {
            snapshot,
            decision,
            replicas_assumed,
            action,
        };

        info!(
            service,
            decision = outcome.decision.kind(),
            action = outcome.action.kind(),
            efficiency = outcome.snapshot.efficiency_rps_per_watt,
            epr = outcome.snapshot.epr_joules_per_request,
            rps = outcome.snapshot.rps,
            power_watts = outcome.snapshot.power_watts,
            replicas = outcome.resulting_replicas(),
            "service evaluated"
        );

        outcome
    }

    /// Run the autoscaler loop: evaluate, then sleep for `interval`.
    ///
    /// A shutdown signal interrupts the sleep; an in-flight tick always
    /// finishes.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = interval.as_millis() as u64,
            services = self.services.len(),
            source = self.source.kind(),
            "autoscaler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcomes = self.tick().await;
            let applied = outcomes
                .iter()
                .filter(|o| matches!(o.action, ScaleAction::Applied { .. }))
                .count();
            debug!(evaluated = outcomes.len(), applied, "tick complete");

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("autoscaler shutting down");
    }
}

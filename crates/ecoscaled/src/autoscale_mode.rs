//! `ecoscaled run`: the scaling control loop.

use tracing::info;

use ecoscale_autoscale::{Autoscaler, ScalingPolicy};
use ecoscale_core::EcoscaleConfig;
use ecoscale_orchestrator::{DryRunOrchestrator, Kubectl, Orchestrator};

pub async fn run(config: EcoscaleConfig, dry_run: bool, synthetic: bool) -> anyhow::Result<()> {
    let source = crate::snapshot_source(&config, synthetic)?;

    let kubectl = Kubectl::from_config(&config.cluster);
    let orchestrator: Box<dyn Orchestrator> = if dry_run {
        info!("dry run: scaling actions are logged, not applied");
        Box::new(DryRunOrchestrator::new(kubectl))
    } else {
        Box::new(kubectl)
    };

    let policy = ScalingPolicy::from(&config.scaling);
    let interval = config.scaling.interval();
    info!(
        services = ?config.services,
        namespace = %config.cluster.namespace,
        min_replicas = policy.min_replicas,
        max_replicas = policy.max_replicas,
        low_efficiency = policy.low_efficiency_threshold,
        high_efficiency = policy.high_efficiency_threshold,
        rps_scale_down = policy.rps_scale_down_threshold,
        "ecoscale autoscaler starting"
    );

    let autoscaler = Autoscaler::new(source, orchestrator, config.services, policy);
    autoscaler.run(interval, crate::shutdown_signal()).await;

    info!("ecoscale autoscaler stopped");
    Ok(())
}

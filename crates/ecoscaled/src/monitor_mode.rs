//! `ecoscaled monitor`: periodic energy summary on stdout.

use chrono::{Local, SecondsFormat};

use ecoscale_collector::render_summary;
use ecoscale_core::{EcoscaleConfig, ServiceSnapshot};
use ecoscale_metrics::SnapshotSource;

pub async fn run(config: EcoscaleConfig, once: bool, synthetic: bool) -> anyhow::Result<()> {
    let source = crate::snapshot_source(&config, synthetic)?;
    let interval = config.scaling.interval();
    let mut shutdown = crate::shutdown_signal();

    loop {
        println!("{}", summary_once(&*source).await);
        if once {
            break;
        }
        println!("Next update in {}s (Ctrl-C to stop)", interval.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}

/// One rendered summary of whatever services the source reported.
async fn summary_once(source: &dyn SnapshotSource) -> String {
    let set = source.snapshots().await;
    let snapshots: Vec<ServiceSnapshot> = set.services.into_values().collect();
    let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    render_summary(&now, &snapshots)
}

//! `ecoscaled collect` and `ecoscaled summarize`: experiment recording.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{Local, SecondsFormat};
use tracing::info;

use ecoscale_collector::{Collector, CsvSink, ScenarioReport};
use ecoscale_core::EcoscaleConfig;
use ecoscale_orchestrator::Kubectl;

pub struct CollectOptions {
    pub scenario: String,
    pub duration: Duration,
    pub every: Duration,
    pub out_dir: PathBuf,
    pub read_hpa: bool,
    pub synthetic: bool,
}

pub async fn run(config: EcoscaleConfig, opts: CollectOptions) -> anyhow::Result<()> {
    validate_scenario(&opts.scenario)?;

    let source = crate::snapshot_source(&config, opts.synthetic)?;
    let kubectl = Kubectl::from_config(&config.cluster);
    let mut collector = Collector::new(source, kubectl, config.services, &opts.scenario);
    if !opts.read_hpa {
        collector = collector.without_hpa();
    }

    let mut sink = CsvSink::create(&opts.out_dir, &opts.scenario, &Local::now())?;
    let polls = collector
        .run(&mut sink, opts.duration, opts.every, crate::shutdown_signal())
        .await?;

    println!("{} data points saved to {}", polls, sink.path().display());
    Ok(())
}

pub fn summarize(dir: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let now = Local::now();
    let report = ScenarioReport::from_dir(&now.to_rfc3339_opts(SecondsFormat::Secs, false), dir)?;
    let path = match out {
        Some(p) => p.to_path_buf(),
        None => dir.join(format!(
            "research_summary_{}.json",
            now.format("%Y%m%d_%H%M%S")
        )),
    };
    std::fs::write(&path, report.to_json()?)
        .with_context(|| format!("writing {}", path.display()))?;

    info!(scenarios = report.scenarios.len(), path = %path.display(), "summary written");
    println!("Summary report saved to {}", path.display());
    Ok(())
}

/// The scenario becomes part of a file name.
fn validate_scenario(scenario: &str) -> anyhow::Result<()> {
    let ok = !scenario.is_empty()
        && scenario
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    anyhow::ensure!(
        ok,
        "scenario {scenario:?} must be non-empty and use only letters, digits, '-' or '_'"
    );
    Ok(())
}

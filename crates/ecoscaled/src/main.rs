//! ecoscaled: the energy-aware autoscaler daemon.
//!
//! Single binary over the ecoscale crates:
//! - Telemetry (Prometheus, or labelled synthetic data)
//! - Replica reads and scaling through kubectl
//! - The scaling control loop
//! - The live energy monitor and the CSV experiment collector
//!
//! # Usage
//!
//! ```text
//! ecoscaled run --config ecoscale.toml
//! ecoscaled run --dry-run --interval 30s
//! ecoscaled monitor --once
//! ecoscaled collect --scenario energy --duration 20m --every 30s
//! ecoscaled summarize --dir research_data
//! ecoscaled check-config --config ecoscale.toml
//! ```

mod autoscale_mode;
mod collect_mode;
mod monitor_mode;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use ecoscale_core::{EcoscaleConfig, parse_duration};
use ecoscale_metrics::{PromClient, SnapshotSource, SyntheticSource, TelemetrySource};

const DEFAULT_LOG_FILTER: &str = "info,ecoscaled=debug,ecoscale=debug";

#[derive(Parser, Debug)]
#[command(name = "ecoscaled", about = "Energy-aware replica autoscaler")]
struct Cli {
    /// Path to ecoscale.toml. Built-in defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override telemetry.url.
    #[arg(long, global = true)]
    prometheus_url: Option<String>,

    /// Override cluster.namespace.
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Override scaling.interval (e.g. "30s", "2m").
    #[arg(long, global = true)]
    interval: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scaling control loop until Ctrl-C.
    Run {
        /// Read replica counts but only log scaling actions.
        #[arg(long)]
        dry_run: bool,

        /// Use randomised demo telemetry instead of Prometheus.
        #[arg(long)]
        synthetic: bool,
    },

    /// Print the per-service energy summary every interval.
    Monitor {
        /// Print one summary and exit.
        #[arg(long)]
        once: bool,

        /// Use randomised demo telemetry instead of Prometheus.
        #[arg(long)]
        synthetic: bool,
    },

    /// Record per-service metrics to CSV for an experiment scenario.
    Collect {
        /// Scenario label, also the file name prefix.
        #[arg(long)]
        scenario: String,

        /// How long to collect.
        #[arg(long, default_value = "10m", value_parser = duration_arg)]
        duration: Duration,

        /// Time between data points.
        #[arg(long, default_value = "30s", value_parser = duration_arg)]
        every: Duration,

        /// Directory for the CSV file.
        #[arg(long, default_value = "research_data")]
        out_dir: PathBuf,

        /// Do not query HPA status.
        #[arg(long)]
        no_hpa: bool,

        /// Use randomised demo telemetry instead of Prometheus.
        #[arg(long)]
        synthetic: bool,
    },

    /// Average every collected CSV in a directory into a JSON report.
    Summarize {
        #[arg(long, default_value = "research_data")]
        dir: PathBuf,

        /// Report path. Defaults to `<dir>/research_summary_<timestamp>.json`.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Load, validate and print the effective configuration.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match &cli.command {
        Command::Summarize { dir, out } => collect_mode::summarize(dir, out.as_deref()),
        Command::CheckConfig => {
            let config = load_config(&cli)?;
            print!("{}", config.to_toml_string().context("rendering configuration")?);
            info!("configuration is valid");
            Ok(())
        }
        Command::Run { dry_run, synthetic } => {
            let config = load_config(&cli)?;
            autoscale_mode::run(config, *dry_run, *synthetic).await
        }
        Command::Monitor { once, synthetic } => {
            let config = load_config(&cli)?;
            monitor_mode::run(config, *once, *synthetic).await
        }
        Command::Collect {
            scenario,
            duration,
            every,
            out_dir,
            no_hpa,
            synthetic,
        } => {
            let config = load_config(&cli)?;
            let opts = collect_mode::CollectOptions {
                scenario: scenario.clone(),
                duration: *duration,
                every: *every,
                out_dir: out_dir.clone(),
                read_hpa: !*no_hpa,
                synthetic: *synthetic,
            };
            collect_mode::run(config, opts).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    match parse_duration(s) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("invalid duration {s:?} (expected e.g. 500ms, 30s, 5m)")),
    }
}

/// Read the config file (or defaults), apply CLI overrides, validate.
fn load_config(cli: &Cli) -> anyhow::Result<EcoscaleConfig> {
    let mut config = match &cli.config {
        Some(path) => EcoscaleConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EcoscaleConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut EcoscaleConfig, cli: &Cli) {
    if let Some(url) = &cli.prometheus_url {
        config.telemetry.url = url.clone();
    }
    if let Some(ns) = &cli.namespace {
        config.cluster.namespace = ns.clone();
    }
    if let Some(interval) = &cli.interval {
        config.scaling.interval = interval.clone();
    }
}

/// The snapshot source for this process: Prometheus, or synthetic data
/// when explicitly requested.
fn snapshot_source(
    config: &EcoscaleConfig,
    synthetic: bool,
) -> anyhow::Result<Box<dyn SnapshotSource>> {
    if synthetic {
        warn!("using SYNTHETIC telemetry: values are randomised and measure nothing");
        return Ok(Box::new(SyntheticSource::new(config.services.clone())));
    }
    let client = PromClient::new(&config.telemetry.url, config.telemetry.timeout())
        .context("building telemetry client")?;
    info!(url = %config.telemetry.url, "using Prometheus telemetry");
    Ok(Box::new(TelemetrySource::new(client, config.queries.clone())))
}

/// Flips to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "could not install Ctrl-C handler");
                // Keep the sender alive so receivers do not see a closed channel.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

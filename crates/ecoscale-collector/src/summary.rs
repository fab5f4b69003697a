//! Text rendering for the live monitor.

use std::fmt::{self, Write};

use ecoscale_core::ServiceSnapshot;

/// Joules per request above which a service is flagged (1 mJ).
pub const HIGH_EPR_JOULES: f64 = 0.001;
/// p99 latency above which a service is flagged.
pub const HIGH_P99_MS: f64 = 1000.0;
/// Requests per watt below which a service with traffic is flagged.
pub const LOW_EFFICIENCY_RPS_PER_WATT: f64 = 1.0;

/// Services flagged by the monitor, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Insights {
    pub high_epr: Vec<String>,
    pub high_latency: Vec<String>,
    pub inefficient: Vec<String>,
}

impl Insights {
    pub fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a ServiceSnapshot>) -> Self {
        let mut insights = Self::default();
        for snap in snapshots {
            if snap.epr_joules_per_request > HIGH_EPR_JOULES {
                insights.high_epr.push(snap.service_id.clone());
            }
            if snap.latency_p99_ms > HIGH_P99_MS {
                insights.high_latency.push(snap.service_id.clone());
            }
            if snap.efficiency_rps_per_watt < LOW_EFFICIENCY_RPS_PER_WATT && snap.rps > 0.0 {
                insights.inefficient.push(snap.service_id.clone());
            }
        }
        insights
    }

    pub fn is_empty(&self) -> bool {
        self.high_epr.is_empty() && self.high_latency.is_empty() && self.inefficient.is_empty()
    }
}

/// Render the summary table followed by any flagged services.
pub fn render_summary(timestamp: &str, snapshots: &[ServiceSnapshot]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    write_summary(&mut out, timestamp, snapshots).ok();
    out
}

fn write_summary(
    out: &mut impl Write,
    timestamp: &str,
    snapshots: &[ServiceSnapshot],
) -> fmt::Result {
    let rule = "=".repeat(80);
    writeln!(out, "{rule}")?;
    writeln!(out, "ENERGY-AWARE AUTOSCALING METRICS SUMMARY")?;
    writeln!(out, "Timestamp: {timestamp}")?;
    writeln!(out, "{rule}")?;

    if snapshots.is_empty() {
        return writeln!(out, "No metrics available.");
    }

    writeln!(
        out,
        "{:<8} {:<8} {:<8} {:<9} {:<9} {:<9}",
        "Service", "Replicas", "RPS", "Power(W)", "EPR(mJ)", "Eff(R/W)"
    )?;
    writeln!(out, "{}", "-".repeat(60))?;
    for snap in snapshots {
        writeln!(
            out,
            "{:<8} {:<8} {:<8.2} {:<9.2} {:<9.3} {:<9.3}",
            snap.service_id,
            snap.replicas,
            snap.rps,
            snap.power_watts,
            snap.epr_millijoules(),
            snap.efficiency_rps_per_watt
        )?;
    }

    let insights = Insights::from_snapshots(snapshots);
    if insights.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "ENERGY INSIGHTS:")?;
    for (label, services) in [
        ("High EPR services (>1mJ/req)", &insights.high_epr),
        ("High latency services (P99>1s)", &insights.high_latency),
        ("Inefficient services (<1 RPS/W)", &insights.inefficient),
    ] {
        if !services.is_empty() {
            writeln!(out, "{label}: {}", services.join(", "))?;
        }
    }
    Ok(())
}

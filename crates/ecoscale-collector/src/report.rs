//! Per-scenario averages over finished collection files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, warn};

use crate::record::MetricsRecord;
use crate::sink::read_records;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAverages {
    pub avg_epr_mj: f64,
    pub avg_power_watts: f64,
    pub avg_rps: f64,
    pub avg_p99_latency_ms: f64,
    pub total_samples: usize,
}

/// scenario → service → averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub generated_at: String,
    pub scenarios: BTreeMap<String, BTreeMap<String, ServiceAverages>>,
}

#[derive(Default)]
struct Sums {
    epr: f64,
    power: f64,
    rps: f64,
    p99: f64,
    n: usize,
}

impl Sums {
    fn add(&mut self, r: &MetricsRecord) {
        self.epr += r.epr_joules_per_request;
        self.power += r.power_watts;
        self.rps += r.rps;
        self.p99 += r.latency_p99_ms;
        self.n += 1;
    }

    fn averages(&self) -> ServiceAverages {
        let n = self.n.max(1) as f64;
        ServiceAverages {
            avg_epr_mj: self.epr / n * 1000.0,
            avg_power_watts: self.power / n,
            avg_rps: self.rps / n,
            avg_p99_latency_ms: self.p99 / n,
            total_samples: self.n,
        }
    }
}

impl ScenarioReport {
    /// Average every record by its `scenario` and `service` columns.
    pub fn from_records<'a>(
        generated_at: &str,
        records: impl IntoIterator<Item = &'a MetricsRecord>,
    ) -> Self {
        let mut sums: BTreeMap<(String, String), Sums> = BTreeMap::new();
        for r in records {
            sums.entry((r.scenario.clone(), r.service.clone()))
                .or_default()
                .add(r);
        }

        let mut scenarios: BTreeMap<String, BTreeMap<String, ServiceAverages>> = BTreeMap::new();
        for ((scenario, service), s) in sums {
            scenarios
                .entry(scenario)
                .or_default()
                .insert(service, s.averages());
        }

        Self {
            generated_at: generated_at.to_string(),
            scenarios,
        }
    }

    /// Read every `*.csv` in `dir`. Files that do not parse as collection
    /// output are skipped with a warning.
    pub fn from_dir(generated_at: &str, dir: &Path) -> anyhow::Result<Self> {
        let mut records = Vec::new();
        for path in csv_files(dir)? {
            match read_records(&path) {
                Ok(mut rows) => {
                    debug!(path = %path.display(), rows = rows.len(), "loaded collection file");
                    records.append(&mut rows);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
            }
        }
        Ok(Self::from_records(generated_at, &records))
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serializing report")
    }
}

fn csv_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

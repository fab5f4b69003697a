//! CSV output for collection runs.

use std::fmt::Display;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, TimeZone};

use crate::record::MetricsRecord;

/// `<scenario>_metrics_<YYYYmmdd_HHMMSS>.csv`, stamped with the run start.
pub fn file_name<Tz: TimeZone>(scenario: &str, started: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("{scenario}_metrics_{}.csv", started.format("%Y%m%d_%H%M%S"))
}

/// Appends records to one CSV file, flushing after every batch so an
/// interrupted run keeps what it collected.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl CsvSink {
    /// Create `dir` if needed and open a new file for `scenario`.
    pub fn create<Tz: TimeZone>(
        dir: &Path,
        scenario: &str,
        started: &DateTime<Tz>,
    ) -> anyhow::Result<Self>
    where
        Tz::Offset: Display,
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        let path = dir.join(file_name(scenario, started));
        let writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write_batch(&mut self, records: &[MetricsRecord]) -> anyhow::Result<()> {
        for record in records {
            self.writer
                .serialize(record)
                .with_context(|| format!("writing to {}", self.path.display()))?;
            self.rows += 1;
        }
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(())
    }
}

/// Read every record of a CSV file written by [`CsvSink`].
pub fn read_records(path: &Path) -> anyhow::Result<Vec<MetricsRecord>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<MetricsRecord>, _>>()
        .with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ecoscale_core::ServiceSnapshot;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap()
    }

    fn record(service: &str, rps: f64) -> MetricsRecord {
        let mut snap = ServiceSnapshot::empty(service);
        snap.rps = rps;
        snap.power_watts = 2.0;
        snap.refresh_derived();
        MetricsRecord::new("2024-05-01T09:05:07+00:00", "baseline", &snap, None)
    }

    #[test]
    fn file_name_format() {
        assert_eq!(
            file_name("energy", &started()),
            "energy_metrics_20240501_090507.csv"
        );
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let mut sink = CsvSink::create(&out, "baseline", &started()).unwrap();
        sink.write_batch(&[record("s0", 1.0), record("s1", 4.0)]).unwrap();
        sink.write_batch(&[record("s0", 2.0)]).unwrap();
        assert_eq!(sink.rows(), 3);

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,service,scenario,replicas,rps,power_watts,epr_joules_per_request,\
             latency_p95_ms,latency_p99_ms,efficiency_rps_per_watt,total_energy_joules,\
             hpa_enabled,hpa_target_replicas,hpa_current_replicas"
        );
        assert_eq!(lines.count(), 3);

        let back = read_records(sink.path()).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[1].service, "s1");
        assert_eq!(back[1].efficiency_rps_per_watt, 2.0);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "timestamp,service\nx,s1\n").unwrap();
        assert!(read_records(&path).is_err());
    }
}

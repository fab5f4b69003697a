//! ecoscale-collector: recording and presenting per-service energy data.
//!
//! - **`Collector`** polls a `SnapshotSource` plus HPA status and appends
//!   one `MetricsRecord` per service per poll to a `CsvSink`.
//! - **`report`** folds finished CSV files into per-scenario averages.
//! - **`summary`** renders the text table and insights printed by the
//!   live monitor.

pub mod collector;
pub mod record;
pub mod report;
pub mod sink;
pub mod summary;

pub use collector::Collector;
pub use record::MetricsRecord;
pub use report::{ScenarioReport, ServiceAverages};
pub use sink::CsvSink;
pub use summary::{Insights, render_summary};

//! Result accumulation, progress persistence and reporting for radio sweeps.

/// Serial line records.
pub mod record;
/// Plain-text and CSV reports.
pub mod report;
/// Progress snapshots and per-point artifacts.
pub mod snapshot;
/// Arena-backed result store and derived metrics.
pub mod store;

pub use record::SerialRecord;
pub use report::{
    percent, render, render_key, round_decimals, round_significant, write_metrics_csv,
};
pub use snapshot::{PointOutcome, ProgressSnapshot, ProgressWriter, SnapshotRef};
pub use store::{ResultStore, RunMetrics, RunResult, RunSummary, SlotKey, NO_RECEPTION_RSSI};

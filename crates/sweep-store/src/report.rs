use std::fmt::Write as _;
use std::path::Path;

use sweep_core::{ErrorInfo, InterferenceType, ResultKey, SweepError};

use crate::store::{ResultStore, RunResult};

/// Rounds `value` to `digits` significant figures.
pub fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let scale = 10f64.powi(digits - 1 - magnitude);
    (value * scale).round() / scale
}

/// Rounds `value` to `digits` decimal places.
pub fn round_decimals(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Scales a ratio to a percentage with three significant figures.
pub fn percent(ratio: f64) -> f64 {
    round_significant(100.0 * ratio, 3)
}

fn render_run(out: &mut String, number: usize, run: &RunResult) {
    match run.metrics() {
        Ok(metrics) => {
            let _ = writeln!(
                out,
                "Run #{number}: PRR: {} ARR: {} Average RSSI: {} Sent: {} Received: {} SentAckd: {}",
                percent(metrics.prr),
                percent(metrics.arr),
                round_decimals(metrics.average_rssi, 3),
                metrics.sent,
                metrics.received,
                metrics.acknowledged,
            );
        }
        Err(_) => {
            let _ = writeln!(out, "Run #{number}: incomplete");
        }
    }
}

/// Renders every run of one firmware build, grouped by interference type in
/// the order given.
pub fn render_key(
    store: &ResultStore,
    key: &ResultKey,
    interference_types: &[InterferenceType],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Setup: {key}");
    for interference_type in interference_types {
        let runs = store.runs(key, *interference_type);
        if runs.is_empty() {
            continue;
        }
        let _ = writeln!(out, "Type: {interference_type}");
        for (idx, run) in runs.iter().enumerate() {
            render_run(&mut out, idx + 1, run);
        }
    }
    out
}

/// Renders every build held by the store.
pub fn render(store: &ResultStore, interference_types: &[InterferenceType]) -> String {
    store
        .keys()
        .into_iter()
        .map(|key| render_key(store, key, interference_types))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes one CSV row of metrics per finalized run.
pub fn write_metrics_csv(store: &ResultStore, path: &Path) -> Result<(), SweepError> {
    let csv_error = |err: csv::Error| {
        SweepError::Persistence(
            ErrorInfo::new("metrics_csv", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
    wtr.write_record([
        "key",
        "interference_type",
        "repetition",
        "sent",
        "received",
        "acknowledged",
        "prr",
        "arr",
        "average_rssi",
    ])
    .map_err(csv_error)?;
    for (slot, run) in store.iter() {
        let Ok(metrics) = run.metrics() else {
            continue;
        };
        wtr.write_record([
            slot.key.to_string(),
            slot.interference_type.to_string(),
            slot.repetition.to_string(),
            metrics.sent.to_string(),
            metrics.received.to_string(),
            metrics.acknowledged.to_string(),
            format!("{:.6}", metrics.prr),
            format!("{:.6}", metrics.arr),
            format!("{:.3}", metrics.average_rssi),
        ])
        .map_err(csv_error)?;
    }
    wtr.flush().map_err(|err| csv_error(err.into()))
}

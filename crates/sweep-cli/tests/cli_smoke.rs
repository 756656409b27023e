use std::fs;
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

fn sweep() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sweep"))
}

#[test]
fn demo_runs_a_complete_sweep() {
    let dir = tempdir().expect("tempdir");
    let output = sweep()
        .args(["demo", "--out"])
        .arg(dir.path())
        .args(["--repetitions", "1"])
        .output()
        .expect("run sweep demo");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("Setup: 26-0-nullrdc_driver"));
    assert!(stdout.contains("Setup: 26-0-contikimac_driver"));

    let snapshot: Value = serde_json::from_slice(
        &fs::read(dir.path().join("communication/data.json")).expect("snapshot"),
    )
    .expect("json");
    assert_eq!(snapshot["outcome"], "completed");
    assert!(dir.path().join("communication/log/metrics.csv").is_file());
    let calls: Value = serde_json::from_slice(
        &fs::read(dir.path().join("device_calls.json")).expect("calls"),
    )
    .expect("json");
    assert!(calls.as_array().map(|calls| !calls.is_empty()).unwrap_or(false));
}

#[test]
fn validate_rejects_out_of_range_channel() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("sweep.yaml");
    fs::write(
        &config,
        format!(
            "motes: {{ sending: a, receiving: b, jamlab: c }}\n\
             channels: [30]\n\
             rdc_drivers: [nullrdc_driver]\n\
             interference_types: [1]\n\
             program_paths: {{ jamlab: {0}, communication: {0} }}\n",
            dir.path().display()
        ),
    )
    .expect("config");
    let output = sweep()
        .args(["validate", "--config"])
        .arg(&config)
        .output()
        .expect("run sweep validate");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("channel_range"));
}

#[test]
fn report_renders_a_saved_snapshot() {
    let dir = tempdir().expect("tempdir");
    let status = sweep()
        .args(["demo", "--out"])
        .arg(dir.path())
        .args(["--repetitions", "1"])
        .status()
        .expect("run sweep demo");
    assert!(status.success());

    let csv = dir.path().join("export.csv");
    let output = sweep()
        .args(["report", "--snapshot"])
        .arg(dir.path().join("communication/data.json"))
        .arg("--csv")
        .arg(&csv)
        .output()
        .expect("run sweep report");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Type: 1793"));
    assert_eq!(fs::read_to_string(&csv).expect("csv").lines().count(), 7);
}

mod common;

use std::fs;

use sweep_core::{
    DeviceRole, InterferenceType, ResultKey, RdcDriver, SweepError, SweepPosition,
};
use sweep_device::{DeviceCall, DeviceOp, SimulatedDevices};
use sweep_exp::SweepPlan;
use sweep_link::MemoryOpener;
use sweep_store::{PointOutcome, ProgressSnapshot};
use tempfile::tempdir;

use common::{controller, script_point, Lab};

fn key() -> ResultKey {
    ResultKey::new(
        sweep_core::Channel::new(26).expect("channel"),
        0,
        RdcDriver::NullRdc,
    )
}

#[tokio::test]
async fn full_sweep_collects_every_run() {
    let dir = tempdir().expect("tempdir");
    let lab = Lab::new(dir.path());
    let config = lab.config("[26]", "[0x701, 3]", 2, 2000);
    let opener = MemoryOpener::new();
    script_point(&opener, 10, 1, &[-60, -62, -61]);
    script_point(&opener, 10, 0, &[-70; 10]);
    script_point(&opener, 5, 5, &[]);
    script_point(&opener, 4, 0, &[-50, -50]);

    let devices = SimulatedDevices::new();
    let log = devices.log();
    let mut sweep = controller(&config, devices, &opener);
    let summary = sweep.run().await.expect("sweep completes");

    assert_eq!(summary.points, 4);
    assert_eq!(log.count(DeviceOp::Build), 4);
    assert_eq!(log.count(DeviceOp::Upload), 4);
    assert_eq!(log.count(DeviceOp::Reset), 8);
    assert_eq!(log.count(DeviceOp::StartJam), 1);
    assert_eq!(log.count(DeviceOp::StopJam), 1);
    let calls = log.calls();
    assert_eq!(calls[2], DeviceCall::StartJam { channel: 14 });
    assert!(matches!(
        &calls[4],
        DeviceCall::Upload { devices, .. } if devices == &[DeviceRole::Receiving, DeviceRole::Sending]
    ));

    let store = &sweep.context().store;
    let jammed = store.runs(&key(), InterferenceType::EXTERNAL_JAMMER);
    assert_eq!(jammed.len(), 2);
    let first = jammed[0].metrics().expect("metrics");
    assert_eq!(first.received, 3);
    assert!((first.prr - 0.3).abs() < 1e-9);
    assert!((first.arr - 0.9).abs() < 1e-9);
    assert!((first.average_rssi + 61.0).abs() < 1e-9);
    let silent = store
        .runs(&key(), InterferenceType::new(3).expect("type"))[0]
        .metrics()
        .expect("metrics");
    assert_eq!(silent.average_rssi, -1.0);
    assert_eq!(silent.arr, 0.0);

    assert!(summary.report.contains("Setup: 26-0-nullrdc_driver"));
    assert!(summary.report.contains("Run #1: PRR: 30 ARR: 90 Average RSSI: -61"));
    assert!(fs::read_to_string(&summary.report_path)
        .expect("report file")
        .contains("Type: 1793"));
    let csv = fs::read_to_string(&summary.metrics_path).expect("metrics file");
    assert_eq!(csv.lines().count(), 5);

    let snapshot = ProgressSnapshot::load(&lab.communication.join("data.json")).expect("snapshot");
    assert_eq!(snapshot.outcome, PointOutcome::Completed);
    assert_eq!(snapshot.position, SweepPosition::new(0, 0, 1, 1));
    assert_eq!(snapshot.plan_hash, sweep.plan().hash().expect("hash"));
    assert!(lab.communication.join("log/data-0-0-0-0.json").is_file());
    assert!(lab.communication.join("log/data-0-0-1-1.json").is_file());
}

#[test]
fn invalid_channel_touches_no_device() {
    let dir = tempdir().expect("tempdir");
    let config = Lab::new(dir.path()).config("[27]", "[1]", 1, 2000);
    let devices = SimulatedDevices::new();
    let log = devices.log();
    let err = SweepPlan::from_config(&config).expect_err("invalid channel");
    assert!(matches!(err, SweepError::Configuration(_)));
    drop(devices);
    assert!(log.is_empty());
}

#[tokio::test]
async fn watchdog_timeout_is_recorded_in_the_snapshot() {
    let dir = tempdir().expect("tempdir");
    let lab = Lab::new(dir.path());
    let config = lab.config("[26]", "[0x701]", 1, 150);
    let opener = MemoryOpener::new();
    opener.lines(common::RECEIVING, Vec::<String>::new());
    opener.lines(common::SENDING, [r#"{"tx":{"seq":0}}"#, "not json"]);

    let devices = SimulatedDevices::new();
    let log = devices.log();
    let mut sweep = controller(&config, devices, &opener);
    let err = sweep.run().await.expect_err("times out");
    assert!(matches!(err, SweepError::ProtocolTimeout(_)));

    let snapshot = ProgressSnapshot::load(&lab.communication.join("data.json")).expect("snapshot");
    assert_eq!(snapshot.outcome, PointOutcome::Failed);
    assert_eq!(snapshot.position, SweepPosition::new(0, 0, 0, 0));
    let setup = snapshot.setup.expect("setup recorded");
    assert_eq!(setup.interference_type, InterferenceType::EXTERNAL_JAMMER);
    assert!(matches!(snapshot.error, Some(SweepError::ProtocolTimeout(_))));
    // Teardown stops the jammer even though the sweep failed.
    assert_eq!(log.count(DeviceOp::StopJam), 1);
}

#[tokio::test]
async fn resume_continues_after_a_device_failure() {
    let dir = tempdir().expect("tempdir");
    let lab = Lab::new(dir.path());
    let config = lab.config("[26]", "[1, 2]", 2, 2000);
    let opener = MemoryOpener::new();
    script_point(&opener, 10, 0, &[-40; 8]);
    script_point(&opener, 10, 0, &[-41; 9]);
    // Consumed by the point whose reset fails.
    script_point(&opener, 10, 0, &[]);

    let failing = SimulatedDevices::new().failing(DeviceOp::Reset, 4);
    let mut sweep = controller(&config, failing, &opener);
    let err = sweep.run().await.expect_err("reset fails");
    assert!(matches!(err, SweepError::DeviceOperation(_)));
    let snapshot = ProgressSnapshot::load(&lab.communication.join("data.json")).expect("snapshot");
    assert_eq!(snapshot.outcome, PointOutcome::Failed);
    assert_eq!(snapshot.position, SweepPosition::new(0, 0, 1, 0));
    assert_eq!(snapshot.results.len(), 2);

    script_point(&opener, 10, 2, &[-45; 7]);
    script_point(&opener, 10, 0, &[-46; 10]);
    let devices = SimulatedDevices::new();
    let log = devices.log();
    let mut resumed = controller(&config, devices, &opener);
    let start = resumed
        .resume(snapshot)
        .expect("plan matches")
        .expect("points remain");
    assert_eq!(start.position, SweepPosition::new(0, 0, 1, 0));
    let summary = resumed.run_from(start).await.expect("resumed sweep completes");

    assert_eq!(summary.points, 2);
    assert_eq!(resumed.context().store.len(), 4);
    let communication_builds = log
        .calls()
        .iter()
        .filter(|call| matches!(call, DeviceCall::Build { program, .. } if program == &lab.communication))
        .count();
    assert_eq!(communication_builds, 1);
    let second = resumed
        .context()
        .store
        .runs(&key(), InterferenceType::new(2).expect("type"));
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].metrics().expect("metrics").received, 7);
}

#[tokio::test]
async fn resume_rejects_a_different_plan() {
    let dir = tempdir().expect("tempdir");
    let lab = Lab::new(dir.path());
    let opener = MemoryOpener::new();
    script_point(&opener, 1, 0, &[-40]);
    let mut sweep = controller(&lab.config("[26]", "[1]", 1, 2000), SimulatedDevices::new(), &opener);
    sweep.run().await.expect("sweep completes");
    let snapshot = ProgressSnapshot::load(&lab.communication.join("data.json")).expect("snapshot");

    let mut other = controller(&lab.config("[26]", "[2]", 1, 2000), SimulatedDevices::new(), &opener);
    let err = other.resume(snapshot).expect_err("plan differs");
    assert_eq!(err.info().code, "plan_mismatch");
}

#[tokio::test]
async fn reports_are_written_before_a_failing_teardown() {
    let dir = tempdir().expect("tempdir");
    let lab = Lab::new(dir.path());
    let config = lab.config("[26]", "[1]", 1, 2000);
    let opener = MemoryOpener::new();
    script_point(&opener, 4, 1, &[-50, -52]);

    // Builds: interference type 1, communication, then the teardown reload of type 0.
    let devices = SimulatedDevices::new().failing(DeviceOp::Build, 2);
    let log = devices.log();
    let mut sweep = controller(&config, devices, &opener);
    let err = sweep.run().await.expect_err("teardown fails");
    assert!(matches!(err, SweepError::DeviceOperation(ref info) if info.code == "simulated_failure"));
    assert_eq!(log.count(DeviceOp::Build), 3);

    let log_dir = lab.communication.join("log");
    let report = fs::read_to_string(log_dir.join(sweep_exp::REPORT_FILE)).expect("report written");
    assert!(report.contains("Run #1: PRR: 50 ARR: 75 Average RSSI: -51"));
    let csv = fs::read_to_string(log_dir.join(sweep_exp::METRICS_FILE)).expect("metrics written");
    assert_eq!(csv.lines().count(), 2);
}

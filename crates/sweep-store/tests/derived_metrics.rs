use serde_json::json;
use sweep_core::{Channel, ExperimentSetup, InterferenceType, RdcDriver, RebuildFlags, SweepError};
use sweep_store::{percent, ResultStore, SerialRecord, SlotKey, NO_RECEPTION_RSSI};

fn setup() -> ExperimentSetup {
    ExperimentSetup {
        channel: Channel::new(15).unwrap(),
        rdc_driver: RdcDriver::NullRdc,
        interference_type: InterferenceType::NONE,
        cca: 0,
        repetition: 0,
        rebuild: RebuildFlags::default(),
    }
}

fn feed(store: &mut ResultStore, value: serde_json::Value) {
    store.accumulate(&SerialRecord::parse(&value.to_string()).unwrap(), &setup());
}

#[test]
fn reception_and_ack_ratios() {
    let mut store = ResultStore::new();
    for _ in 0..80 {
        feed(&mut store, json!({"rx": {"rssi": -70}}));
    }
    feed(&mut store, json!({"result": {"sent": 100, "failed": 10}}));
    let metrics = store.derive(&setup()).expect("derive");
    assert!((metrics.prr - 0.80).abs() < 1e-12);
    assert!((metrics.arr - 0.90).abs() < 1e-12);
    assert_eq!(percent(metrics.prr), 80.0);
    assert_eq!(metrics.acknowledged, 90);

    let run = store.get(&SlotKey::of(&setup())).unwrap();
    assert_eq!(run.result.received, Some(80));
    assert_eq!(run.result.prr, Some(metrics.prr));
    assert_eq!(run.result.arr, Some(metrics.arr));
    assert_eq!(run.result.average_rssi, Some(-70.0));
}

#[test]
fn rssi_sentinel_without_receptions() {
    let mut store = ResultStore::new();
    feed(&mut store, json!({"tx": {"seq": 1}}));
    feed(&mut store, json!({"result": {"sent": 1, "failed": 1}}));
    let metrics = store.derive(&setup()).unwrap();
    assert_eq!(metrics.average_rssi, NO_RECEPTION_RSSI);
    assert_eq!(metrics.prr, 0.0);
    assert_eq!(metrics.arr, 0.0);
}

#[test]
fn rssi_mean_over_receptions() {
    let mut store = ResultStore::new();
    for rssi in [-60, -62, -61] {
        feed(&mut store, json!({"rx": {"rssi": rssi}}));
    }
    feed(&mut store, json!({"result": {"sent": 3, "failed": 0}}));
    assert_eq!(store.derive(&setup()).unwrap().average_rssi, -61.0);
}

#[test]
fn signal_field_is_accepted() {
    let mut store = ResultStore::new();
    for signal in [-50, -54] {
        feed(&mut store, json!({"rx": {"signal": signal}}));
    }
    feed(&mut store, json!({"result": {"sent": 2, "failed": 0}}));
    assert_eq!(store.derive(&setup()).unwrap().average_rssi, -52.0);
}

#[test]
fn derive_requires_a_terminal_summary() {
    let mut store = ResultStore::new();
    let err = store.derive(&setup()).expect_err("missing");
    assert_eq!(err.info().code, "run_missing");

    feed(&mut store, json!({"tx": {}}));
    let err = store.derive(&setup()).expect_err("not finalized");
    assert!(matches!(err, SweepError::Protocol(_)));

    feed(&mut store, json!({"result": {"failed": 0}}));
    let err = store.derive(&setup()).expect_err("no sent");
    assert_eq!(err.info().code, "summary_missing_sent");
}

#[test]
fn mistyped_failed_count_is_a_protocol_error() {
    let mut store = ResultStore::new();
    feed(&mut store, json!({"result": {"sent": 3, "failed": -1}}));
    let err = store.derive(&setup()).expect_err("negative failed count");
    assert!(matches!(
        err,
        SweepError::Protocol(ref info)
            if info.code == "summary_field_invalid" && info.context["field"] == "failed"
    ));
}

#[test]
fn corrected_count_clears_the_rejection() {
    let mut store = ResultStore::new();
    feed(&mut store, json!({"result": {"sent": 1.0}}));
    feed(&mut store, json!({"result": {"sent": 4, "failed": 0}}));
    let metrics = store.derive(&setup()).expect("sent corrected");
    assert_eq!(metrics.sent, 4);
    let run = store.get(&SlotKey::of(&setup())).unwrap();
    assert!(run.result.rejected.is_empty());
}

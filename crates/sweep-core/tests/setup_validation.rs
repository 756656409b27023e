use sweep_core::{
    map_jammer_channel, stable_hash_string, to_canonical_json_bytes, Channel, ExperimentSetup,
    InterferenceType, RdcDriver, RebuildFlags, SweepError, SweepPosition,
};

#[test]
fn channels_outside_band_are_rejected() {
    for raw in [0u16, 10, 27, 255, 1000] {
        let err = Channel::new(raw).expect_err("out of range");
        assert!(matches!(err, SweepError::Configuration(_)));
    }
    for raw in 11u16..=26 {
        assert_eq!(Channel::new(raw).expect("in range").as_raw() as u16, raw);
    }
}

#[test]
fn channel_deserialization_is_validated() {
    assert!(serde_json::from_str::<Channel>("26").is_ok());
    assert!(serde_json::from_str::<Channel>("30").is_err());
}

#[test]
fn jammer_mapping_is_strict() {
    let ch26 = Channel::new(26).unwrap();
    assert_eq!(map_jammer_channel(ch26).unwrap(), 14);
    let err = map_jammer_channel(Channel::new(25).unwrap()).expect_err("strict");
    assert_eq!(err.info().code, "jammer_channel");
}

#[test]
fn setup_serializes_with_named_driver() {
    let setup = ExperimentSetup {
        channel: Channel::new(22).unwrap(),
        rdc_driver: RdcDriver::NullRdc,
        interference_type: InterferenceType::EXTERNAL_JAMMER,
        cca: 0,
        repetition: 1,
        rebuild: RebuildFlags::default(),
    };
    let json = String::from_utf8(to_canonical_json_bytes(&setup).unwrap()).unwrap();
    assert!(json.contains("\"rdc_driver\":\"nullrdc_driver\""));
    assert!(json.contains("\"interference_type\":1793"));
    assert_eq!(setup.result_key().as_str(), "22-0-nullrdc_driver");
}

#[test]
fn hashes_are_stable_and_position_labels_are_dashed() {
    let pos = SweepPosition::new(1, 0, 3, 2);
    assert_eq!(pos.label(), "1-0-3-2");
    assert_eq!(
        stable_hash_string(&pos).unwrap(),
        stable_hash_string(&SweepPosition::new(1, 0, 3, 2)).unwrap()
    );
    assert_ne!(
        stable_hash_string(&pos).unwrap(),
        stable_hash_string(&SweepPosition::default()).unwrap()
    );
}

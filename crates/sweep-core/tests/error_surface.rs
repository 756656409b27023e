use sweep_core::errors::{ErrorInfo, SweepError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("channel", "26")
        .with_context("role", "sending")
}

#[test]
fn configuration_error_surface() {
    let err = SweepError::Configuration(sample_info("channel_range", "bad channel"));
    assert_eq!(err.info().code, "channel_range");
    assert!(err.info().context.contains_key("channel"));
    assert!(err.is_fatal());
}

#[test]
fn device_error_surface() {
    let err = SweepError::DeviceOperation(sample_info("make_failed", "exit status 2"));
    assert_eq!(err.info().code, "make_failed");
    assert!(err.to_string().starts_with("device operation error: exit status 2"));
}

#[test]
fn timeout_error_surface() {
    let err = SweepError::ProtocolTimeout(sample_info("watchdog", "no summary"));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("role=sending"));
}

#[test]
fn parse_errors_are_recoverable() {
    let err = SweepError::RecordParse(sample_info("json", "expected value"));
    assert!(!err.is_fatal());
}

#[test]
fn errors_roundtrip_through_json() {
    let err = SweepError::Persistence(
        ErrorInfo::new("snapshot_write", "disk full").with_hint("free some space"),
    );
    let json = serde_json::to_string(&err).expect("json");
    assert!(json.contains("\"family\":\"Persistence\""));
    let back: SweepError = serde_json::from_str(&json).expect("decode");
    assert_eq!(back, err);
}

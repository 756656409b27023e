#![cfg(unix)]

use sweep_core::SweepError;
use sweep_device::CommandSpec;
use tempfile::tempdir;

#[test]
fn successful_command_returns_ok() {
    CommandSpec::new("true").run().expect("true succeeds");
}

#[test]
fn non_zero_exit_is_device_operation_error() {
    let dir = tempdir().expect("tempdir");
    let err = CommandSpec::new("sh")
        .arg("-c")
        .arg("echo broken >&2; exit 3")
        .current_dir(dir.path())
        .run()
        .expect_err("exit 3");
    let SweepError::DeviceOperation(info) = err else {
        panic!("unexpected family: {err:?}");
    };
    assert_eq!(info.code, "command_failed");
    assert_eq!(info.context.get("status").map(String::as_str), Some("3"));
    assert_eq!(info.context.get("stderr").map(String::as_str), Some("broken"));
    assert!(info.context.contains_key("cwd"));
}

#[test]
fn missing_program_is_device_operation_error() {
    let err = CommandSpec::new("definitely-not-a-real-binary-for-sweeps")
        .run()
        .expect_err("spawn fails");
    assert!(matches!(err, SweepError::DeviceOperation(ref info) if info.code == "command_spawn"));
}

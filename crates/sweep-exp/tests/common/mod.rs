#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sweep_device::SimulatedDevices;
use sweep_exp::{SweepConfig, SweepContext, SweepController, SweepPlan, TestRunner};
use sweep_link::{MemoryOpener, SerialChannelManager};
use sweep_store::ProgressWriter;

pub const RECEIVING: &str = "/dev/ttyUSB1";
pub const SENDING: &str = "/dev/ttyUSB2";

pub struct Lab {
    pub root: PathBuf,
    pub communication: PathBuf,
    pub jamlab: PathBuf,
}

impl Lab {
    pub fn new(root: &Path) -> Self {
        let communication = root.join("communication");
        let jamlab = root.join("jamlab");
        fs::create_dir_all(&communication).expect("communication dir");
        fs::create_dir_all(&jamlab).expect("jamlab dir");
        Self {
            root: root.to_path_buf(),
            communication,
            jamlab,
        }
    }

    pub fn config(&self, channels: &str, types: &str, repetitions: u32, watchdog_ms: u64) -> SweepConfig {
        let yaml = format!(
            "motes:\n  sending: {SENDING}\n  receiving: {RECEIVING}\n  jamlab: /dev/ttyUSB0\n\
             repetitions: {repetitions}\n\
             channels: {channels}\n\
             rdc_drivers: [nullrdc_driver]\n\
             interference_types: {types}\n\
             program_paths:\n  jamlab: {}\n  communication: {}\n\
             timing:\n  watchdog_ms: {watchdog_ms}\n  quiescence_ms: 40\n",
            self.jamlab.display(),
            self.communication.display(),
        );
        SweepConfig::from_yaml(&yaml).expect("config parses")
    }
}

/// Queues one point worth of serial output: `rssi.len()` receive events and
/// `sent` transmit events followed by the summary.
pub fn script_point(opener: &MemoryOpener, sent: u64, failed: u64, rssi: &[i64]) {
    opener.lines(
        RECEIVING,
        rssi.iter()
            .enumerate()
            .map(|(seq, value)| format!(r#"{{"rx":{{"seq":{seq},"rssi":{value}}}}}"#)),
    );
    let mut sending: Vec<String> = (0..sent)
        .map(|seq| format!(r#"{{"tx":{{"seq":{seq}}}}}"#))
        .collect();
    sending.push(format!(r#"{{"result":{{"sent":{sent},"failed":{failed}}}}}"#));
    opener.lines(SENDING, sending);
}

pub fn controller(
    config: &SweepConfig,
    devices: SimulatedDevices,
    opener: &MemoryOpener,
) -> SweepController<SimulatedDevices> {
    let plan = SweepPlan::from_config(config).expect("valid config");
    let links = SerialChannelManager::new(Arc::new(opener.clone()), config.motes.by_role());
    let runner = TestRunner::new(
        devices,
        links,
        config.program_paths.clone(),
        config.protocol_timing(),
    );
    let context = SweepContext::new(ProgressWriter::new(config.program_paths.communication.clone()));
    SweepController::new(plan, runner, context).expect("controller")
}

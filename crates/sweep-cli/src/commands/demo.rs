use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use sweep_core::{to_canonical_json_bytes, InterferenceType, RdcDriver};
use sweep_device::SimulatedDevices;
use sweep_exp::{
    LoggingConfig, MotePaths, ProgramPaths, SerialConfig, SweepConfig, SweepContext,
    SweepController, SweepPlan, TestRunner, TimingConfig,
};
use sweep_link::{MemoryOpener, SerialChannelManager};
use sweep_store::ProgressWriter;
use tracing::info;

use crate::logging;

const SENDING: &str = "sim://sending";
const RECEIVING: &str = "sim://receiving";
const PACKETS: u64 = 20;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Directory that receives the simulated lab and its outputs.
    #[arg(long)]
    pub out: PathBuf,
    /// Repetitions per interference type.
    #[arg(long, default_value_t = 2)]
    pub repetitions: u32,
}

pub async fn run(args: &DemoArgs) -> Result<(), Box<dyn Error>> {
    logging::init(&LoggingConfig::default())?;
    let config = demo_config(&args.out, args.repetitions)?;
    let plan = SweepPlan::from_config(&config)?;

    let opener = MemoryOpener::new();
    let types = plan.interference_types();
    for point in 0..plan.len() {
        let interference_type = types[point / args.repetitions as usize % types.len()];
        script_point(&opener, point as u64, interference_type);
    }

    let devices = SimulatedDevices::new();
    let calls = devices.log();
    let links = SerialChannelManager::new(Arc::new(opener), config.motes.by_role());
    let runner = TestRunner::new(
        devices,
        links,
        config.program_paths.clone(),
        config.protocol_timing(),
    );
    let context = SweepContext::new(ProgressWriter::new(
        config.program_paths.communication.clone(),
    ));
    let mut controller = SweepController::new(plan, runner, context)?;
    let summary = controller.run().await?;

    let calls_path = args.out.join("device_calls.json");
    fs::write(&calls_path, to_canonical_json_bytes(&calls.calls())?)?;
    println!("{}", summary.report);
    info!(
        points = summary.points,
        report = %summary.report_path.display(),
        device_calls = %calls_path.display(),
        "demo sweep complete"
    );
    Ok(())
}

fn demo_config(out: &Path, repetitions: u32) -> Result<SweepConfig, Box<dyn Error>> {
    let communication = out.join("communication");
    let jamlab = out.join("jamlab");
    fs::create_dir_all(&communication)?;
    fs::create_dir_all(&jamlab)?;
    fs::write(communication.join("Makefile"), "CONTIKI_PROJECT = ab-test\n")?;
    fs::write(jamlab.join("Makefile"), "CONTIKI_PROJECT = jamlab\n")?;
    Ok(SweepConfig {
        motes: MotePaths {
            sending: SENDING.to_string(),
            receiving: RECEIVING.to_string(),
            jamlab: "sim://jamlab".to_string(),
        },
        repetitions,
        channels: vec![26],
        rdc_drivers: vec![RdcDriver::NullRdc, RdcDriver::ContikiMac],
        interference_types: vec![InterferenceType::EXTERNAL_JAMMER.as_raw(), 3, 0],
        program_paths: ProgramPaths {
            jamlab,
            communication,
        },
        cca: 0,
        timing: TimingConfig {
            watchdog_ms: 2_000,
            quiescence_ms: 20,
        },
        serial: SerialConfig::default(),
        logging: LoggingConfig::default(),
    })
}

/// Queues the serial output of one point. Interference lowers the delivery
/// rate and the signal strength so the report shows a spread.
fn script_point(opener: &MemoryOpener, point: u64, interference_type: InterferenceType) {
    let penalty = match interference_type.as_raw() {
        0 => 0,
        raw if raw == InterferenceType::EXTERNAL_JAMMER.as_raw() => 8,
        raw => u64::from(raw),
    };
    let received = PACKETS - penalty - point % 3;
    let failed = (penalty / 2 + point % 2).min(PACKETS);
    opener.lines(
        RECEIVING,
        (0..received).map(|seq| {
            let rssi = -52 - (penalty as i64) - (seq % 4) as i64;
            format!(r#"{{"rx":{{"seq":{seq},"rssi":{rssi}}}}}"#)
        }),
    );
    let mut sending: Vec<String> = (0..PACKETS)
        .map(|seq| format!(r#"{{"tx":{{"seq":{seq}}}}}"#))
        .collect();
    sending.push(format!(
        r#"{{"result":{{"sent":{PACKETS},"failed":{failed}}}}}"#
    ));
    opener.lines(SENDING, sending);
}

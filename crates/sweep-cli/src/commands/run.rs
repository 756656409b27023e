use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use sweep_device::{ContikiMake, LabDevices, Nexutil};
use sweep_exp::{StartPoint, SweepConfig, SweepContext, SweepController, SweepPlan, TestRunner};
use sweep_link::{SerialChannelManager, SerialOpener};
use sweep_store::{render, ProgressSnapshot, ProgressWriter};
use tracing::info;

use crate::logging;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML sweep configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Progress snapshot to continue from.
    #[arg(long)]
    pub resume: Option<PathBuf>,
    /// `nexutil` executable driving the external jammer.
    #[arg(long, default_value = "nexutil")]
    pub nexutil: String,
}

pub async fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let config = SweepConfig::load(&args.config)?;
    logging::init(&config.logging)?;
    let plan = SweepPlan::from_config(&config)?;

    let motes = config.motes.by_role();
    let devices = LabDevices::new(
        ContikiMake::new(motes.clone(), &config.program_paths.communication),
        Nexutil::new(&args.nexutil),
    );
    let opener = SerialOpener::new(
        config.serial.baud_rate,
        Duration::from_millis(config.serial.read_timeout_ms),
    );
    let links = SerialChannelManager::new(Arc::new(opener), motes)
        .with_line_capacity(config.serial.line_capacity);
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

    let start = match &args.resume {
        Some(path) => match controller.resume(ProgressSnapshot::load(path)?)? {
            Some(start) => start,
            None => {
                info!(snapshot = %path.display(), "snapshot already covers the whole sweep");
                return Ok(());
            }
        },
        None => StartPoint::default(),
    };

    match controller.run_from(start).await {
        Ok(summary) => {
            println!("{}", summary.report);
            info!(
                report = %summary.report_path.display(),
                metrics = %summary.metrics_path.display(),
                "sweep complete"
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("sweep failed: {err}");
            let partial = render(
                &controller.context().store,
                controller.plan().interference_types(),
            );
            if !partial.is_empty() {
                println!("{partial}");
            }
            Err(Box::new(err))
        }
    }
}

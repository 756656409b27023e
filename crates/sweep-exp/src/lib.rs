#![deny(missing_docs)]
#![doc = "Configuration, planning and orchestration of radio interference sweeps."]

pub mod config;
pub mod controller;
pub mod plan;
pub mod runner;

pub use config::{
    LogLevel, LoggingConfig, MotePaths, ProgramPaths, SerialConfig, SweepConfig, TimingConfig,
};
pub use controller::{SweepContext, SweepController, SweepSummary, METRICS_FILE, REPORT_FILE};
pub use plan::{StartPoint, SweepPlan};
pub use runner::TestRunner;

use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    demo::{self, DemoArgs},
    report::{self, ReportArgs},
    run::{self, RunArgs},
    validate::{self, ValidateArgs},
};

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "sweep", about = "Radio interference sweep orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a sweep against the lab hardware.
    Run(RunArgs),
    /// Check a configuration without touching any device.
    Validate(ValidateArgs),
    /// Re-render the report of a saved progress snapshot.
    Report(ReportArgs),
    /// Run a complete sweep against simulated devices and scripted serial lines.
    Demo(DemoArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run::run(&args).await,
        Command::Validate(args) => validate::run(&args),
        Command::Report(args) => report::run(&args),
        Command::Demo(args) => demo::run(&args).await,
    }
}

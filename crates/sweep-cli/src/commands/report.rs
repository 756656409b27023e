use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use sweep_core::InterferenceType;
use sweep_store::{render, write_metrics_csv, ProgressSnapshot};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Progress snapshot (`data.json`).
    #[arg(long)]
    pub snapshot: PathBuf,
    /// Also export per-run metrics as CSV.
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

pub fn run(args: &ReportArgs) -> Result<(), Box<dyn Error>> {
    let snapshot = ProgressSnapshot::load(&args.snapshot)?;
    let mut types: Vec<InterferenceType> = Vec::new();
    for (slot, _) in snapshot.results.iter() {
        if !types.contains(&slot.interference_type) {
            types.push(slot.interference_type);
        }
    }
    println!("{}", render(&snapshot.results, &types));
    if let Some(error) = &snapshot.error {
        println!("Stopped at {}: {error}", snapshot.position.label());
    }
    if let Some(path) = &args.csv {
        write_metrics_csv(&snapshot.results, path)?;
    }
    Ok(())
}

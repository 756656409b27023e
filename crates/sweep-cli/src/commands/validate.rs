use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use sweep_exp::{SweepConfig, SweepPlan};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// YAML sweep configuration.
    #[arg(long)]
    pub config: PathBuf,
}

pub fn run(args: &ValidateArgs) -> Result<(), Box<dyn Error>> {
    let config = SweepConfig::load(&args.config)?;
    let problems = config.problems();
    for problem in &problems {
        eprintln!("{problem}");
    }
    if !problems.is_empty() {
        return Err(format!("{} configuration problem(s)", problems.len()).into());
    }
    let plan = SweepPlan::from_config(&config)?;
    println!("points={}", plan.len());
    println!("plan_hash={}", plan.hash()?);
    Ok(())
}

use super::helpers::{install_interrupt_handler, job_file_or_default};
use super::{CANCELLED_EXIT_CODE, CliError};
use anyhow::Context;
use lmr_core::pipeline::{JobOutcome, load_job, plan_job, run_job};
use lmr_core::restart::find_last_timestep;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(clap::Args)]
pub(super) struct JobArgs {
    /// Job file (defaults to lmrStart.json in the current directory)
    #[arg(value_name = "JOB")]
    job: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct PlanArgs {
    /// Job file (defaults to lmrStart.json in the current directory)
    #[arg(value_name = "JOB")]
    job: Option<PathBuf>,

    /// Print the resolved job as JSON instead of the bare command
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct LastTimestepArgs {
    /// Output directory to scan for checkpoints
    #[arg(value_name = "DIR")]
    dir: PathBuf,
}

pub(super) fn run_job_command(args: JobArgs) -> Result<i32, CliError> {
    let job_file = job_file_or_default(args.job);
    let cancel = install_interrupt_handler()?;

    match run_job(&job_file, cancel)? {
        JobOutcome::Completed { cleanup } => {
            if let Some(report) = cleanup {
                info!(
                    timestep = report.last_timestep,
                    removed = report.removed.len(),
                    "kept final equilibration checkpoint"
                );
            }
            info!(job = %job_file.display(), "job finished");
            Ok(0)
        }
        JobOutcome::SoftInterrupted { .. } => {
            warn!(job = %job_file.display(), "thermal equilibration stopped early");
            Ok(0)
        }
        JobOutcome::Cancelled => {
            eprintln!("You have cancelled the job; all simulation processes have been stopped.");
            Ok(CANCELLED_EXIT_CODE)
        }
    }
}

pub(super) fn run_plan_command(args: PlanArgs) -> Result<i32, CliError> {
    let job_file = job_file_or_default(args.job);
    let prepared = plan_job(load_job(&job_file)?)?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&prepared)
            .context("failed to render the resolved job as JSON")?;
        println!("{}", rendered);
    } else {
        println!("{}", prepared.command);
    }
    Ok(0)
}

pub(super) fn run_last_timestep_command(args: LastTimestepArgs) -> Result<i32, CliError> {
    let timestep = find_last_timestep(&args.dir)?;
    println!("{}", timestep);
    Ok(0)
}

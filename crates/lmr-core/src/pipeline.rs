//! One job from job file to finished run.

use crate::cleanup::{CleanupReport, post_run_cleanup};
use crate::command::{AssembledCommand, assemble_for_job};
use crate::config::{ConfigTree, normalize};
use crate::domain::{LmrResult, Phase};
use crate::model::ModelParameters;
use crate::restart::{StagingReport, next_staging_dir, prepare_output, resolve_restart_timestep};
use crate::solver::{SolverInputs, SolverPlan, select_solver};
use crate::supervisor::{CancellationFlag, OutputSink, RunOutcome, RunSupervisor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_JOB_FILE: &str = "lmrStart.json";

/// A job ready to launch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedJob {
    pub params: ModelParameters,
    pub solver: SolverPlan,
    pub command: AssembledCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        cleanup: Option<CleanupReport>,
    },
    /// Equilibration stopped early; the last checkpoint stands as the result.
    SoftInterrupted {
        cleanup: Option<CleanupReport>,
    },
    /// Production run cancelled. Nothing was cleaned up.
    Cancelled,
}

/// The directory holding `job_file`, where descriptors are read from and
/// output directories are created.
pub fn job_dir_for(job_file: &Path) -> PathBuf {
    match job_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn load_job(job_file: &Path) -> LmrResult<ModelParameters> {
    let tree = ConfigTree::from_path(job_file)?;
    normalize(&tree, &job_dir_for(job_file))
}

/// Resolves the job without touching the filesystem beyond reads: the restart
/// step is looked up but no directory is created and nothing is staged.
pub fn plan_job(mut params: ModelParameters) -> LmrResult<PreparedJob> {
    let output_dir = params.output_path().to_path_buf();
    if params.restart {
        let timestep = resolve_restart_timestep(&output_dir, params.restart_step)?;
        params.restart_timestep = Some(timestep);
    }
    params.xmls_dir = next_staging_dir(&output_dir, params.restart)?;
    finish_preparation(params)
}

/// Creates the output layout, stages descriptors and assembles the command.
pub fn prepare_job(mut params: ModelParameters) -> LmrResult<(PreparedJob, StagingReport)> {
    let staging = prepare_output(&mut params)?;
    let prepared = finish_preparation(params)?;
    Ok((prepared, staging))
}

fn finish_preparation(mut params: ModelParameters) -> LmrResult<PreparedJob> {
    let solver = select_solver(
        &SolverInputs::from_parameters(&params),
        &params.simulation_root,
    )?;
    params.multigrid_level = solver.multigrid_level;
    let command = assemble_for_job(&params, &solver)?;
    Ok(PreparedJob {
        params,
        solver,
        command,
    })
}

/// The sink a job writes to: its log file when logging is on, else the terminal.
pub fn output_sink_for(params: &ModelParameters) -> LmrResult<OutputSink> {
    if params.write_log {
        OutputSink::log_file(params.log_file_path())
    } else {
        Ok(OutputSink::terminal())
    }
}

pub fn run_prepared(
    prepared: &PreparedJob,
    sink: &mut OutputSink,
    cancel: CancellationFlag,
) -> LmrResult<JobOutcome> {
    let params = &prepared.params;
    if params.verbose {
        sink.notice(&format!(
            "running the following command:\n{}",
            prepared.command
        ))?;
    }

    info!(
        phase = %params.phase(),
        run = %params.run_description(),
        output = %params.output_path().display(),
        "launching"
    );
    let outcome = RunSupervisor::new(cancel).run(&prepared.command, params.phase(), sink)?;

    match (outcome, params.phase()) {
        (RunOutcome::Completed, _) => Ok(JobOutcome::Completed {
            cleanup: post_run_cleanup(params)?,
        }),
        (RunOutcome::Interrupted, Phase::Equilibration) => Ok(JobOutcome::SoftInterrupted {
            cleanup: post_run_cleanup(params)?,
        }),
        (RunOutcome::Interrupted, Phase::Production) => Ok(JobOutcome::Cancelled),
    }
}

/// Loads, prepares and runs the job in `job_file`.
pub fn run_job(job_file: &Path, cancel: CancellationFlag) -> LmrResult<JobOutcome> {
    let params = load_job(job_file)?;
    let (prepared, staging) = prepare_job(params)?;
    info!(
        staging = %staging.staging_dir.display(),
        descriptors = staging.staged_descriptors.len(),
        "descriptors staged"
    );
    let mut sink = output_sink_for(&prepared.params)?;
    run_prepared(&prepared, &mut sink, cancel)
}

use crate::domain::{Dimensionality, Phase, Resolution, RestartStep};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Duration, cadence and mesh settings for one run phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunControls {
    pub description: String,
    pub resolution: Resolution,
    pub max_timesteps: u64,
    /// Simulated years.
    pub max_time: f64,
    pub checkpoint_every_x_years: f64,
    pub checkpoint_every_x_steps: u64,
}

impl RunControls {
    /// `<XxYxZ>_<description>`, shared by output directories and log files.
    pub fn labelled_description(&self) -> String {
        format!("{}_{}", self.resolution.textual(), self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolverStage {
    pub tolerance: f64,
    pub min_iterations: u32,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParallelLauncher {
    pub command: String,
    pub cpu_flag: String,
    /// Present when the launcher takes an explicit CPU count; supercomputer
    /// style launchers receive only `command`.
    pub cpus: Option<String>,
}

/// Fully resolved job record. Built by the normalizer, then completed in
/// place by the pipeline stages (staging directory, multigrid level, restart
/// timestep).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParameters {
    pub main: RunControls,
    pub thermal: RunControls,
    pub linear_solver: SolverStage,
    pub nonlinear_solver: SolverStage,

    pub run_thermal_phase: bool,
    pub write_log: bool,
    pub output_pictures: bool,
    pub restart: bool,
    pub force_direct_solve: bool,
    pub force_multigrid_solve: bool,
    pub update_xml_information: bool,
    pub preserve_thermal_checkpoints: bool,
    pub verbose: bool,

    pub restart_step: RestartStep,
    /// Zero leaves the multigrid depth to the selector.
    pub forced_multigrid_level: u32,

    pub binary_path: PathBuf,
    pub simulation_root: PathBuf,
    pub launcher: ParallelLauncher,
    /// Passed to the simulation as a single argument, never split on spaces.
    /// Put one flag per job; `--a=1 --b=2` arrives as one malformed flag.
    pub extra_flags: String,

    pub job_dir: PathBuf,
    pub model_output_path: PathBuf,
    pub thermal_output_path: PathBuf,
    pub xmls_dir: PathBuf,

    pub dimensionality: Dimensionality,
    pub multigrid_level: Option<u32>,
    pub restart_timestep: Option<u32>,
}

impl ModelParameters {
    pub const fn phase(&self) -> Phase {
        if self.run_thermal_phase {
            Phase::Equilibration
        } else {
            Phase::Production
        }
    }

    /// Controls of the phase this invocation runs.
    pub fn active(&self) -> &RunControls {
        match self.phase() {
            Phase::Equilibration => &self.thermal,
            Phase::Production => &self.main,
        }
    }

    pub fn output_path(&self) -> &Path {
        match self.phase() {
            Phase::Equilibration => &self.thermal_output_path,
            Phase::Production => &self.model_output_path,
        }
    }

    pub fn run_description(&self) -> String {
        self.active().labelled_description()
    }

    pub fn log_file_path(&self) -> PathBuf {
        let name = match self.phase() {
            Phase::Equilibration => format!(
                "log_initial-condition_{}.txt",
                self.thermal.labelled_description()
            ),
            Phase::Production => format!("log_result_{}.txt", self.main.labelled_description()),
        };
        self.job_dir.join(name)
    }
}

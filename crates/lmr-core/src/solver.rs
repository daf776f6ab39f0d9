//! Direct-vs-multigrid solver selection.
//!
//! The decision table, highest precedence first:
//!
//! | condition                                   | solver    |
//! |---------------------------------------------|-----------|
//! | thermal equilibration phase                 | direct    |
//! | `force_multigrid_solve`                     | multigrid |
//! | `force_direct_solve`                        | direct    |
//! | 2D and `x * y < 1_000_000`                  | direct    |
//! | otherwise                                   | multigrid |

use crate::domain::{Axis, Dimensionality, LmrError, LmrResult, Resolution};
use crate::model::ModelParameters;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DIRECT_SOLVE_CELL_LIMIT: u64 = 1_000_000;
pub const MULTIGRID_DESCRIPTOR: &str = "StgFEM/Apps/src/MultigridForRegular.xml";

const DIRECT_FLAGS: [&str; 6] = [
    "-Uzawa_velSolver_pc_factor_mat_solver_package mumps",
    "-mat_mumps_icntl_14 200",
    "-Uzawa_velSolver_ksp_type preonly",
    "-Uzawa_velSolver_pc_type lu",
    "-log_summary",
    "-options_left",
];

const MULTIGRID_FLAGS: [&str; 8] = [
    "-mg_coarse_pc_factor_mat_solver_package mumps",
    "-mg_coarse_pc_type lu",
    "-mg_coarse_ksp_type preonly",
    "-A11_pc_mg_smoothup 2",
    "-A11_pc_mg_smoothdown 2",
    "-A11_ksp_monitor",
    "-options_left",
    "-log_summary",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverFamily {
    Direct,
    Multigrid,
}

impl SolverFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct (MUMPS LU)",
            Self::Multigrid => "multigrid",
        }
    }
}

/// The structural facts the selector looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverInputs {
    pub resolution: Resolution,
    pub dimensionality: Dimensionality,
    pub thermal_phase: bool,
    pub force_direct_solve: bool,
    pub force_multigrid_solve: bool,
    pub forced_multigrid_level: u32,
}

impl SolverInputs {
    pub fn from_parameters(params: &ModelParameters) -> Self {
        Self {
            resolution: params.active().resolution,
            dimensionality: params.dimensionality,
            thermal_phase: params.run_thermal_phase,
            force_direct_solve: params.force_direct_solve,
            force_multigrid_solve: params.force_multigrid_solve,
            forced_multigrid_level: params.forced_multigrid_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolverPlan {
    pub family: SolverFamily,
    pub multigrid_level: Option<u32>,
    pub flags: Vec<String>,
    /// Descriptors that must follow the job's own input descriptors.
    pub extra_descriptors: Vec<PathBuf>,
}

pub fn choose_family(inputs: &SolverInputs) -> SolverFamily {
    if inputs.thermal_phase {
        return SolverFamily::Direct;
    }
    if inputs.force_multigrid_solve {
        return SolverFamily::Multigrid;
    }
    let small_planar = inputs.dimensionality == Dimensionality::Two
        && inputs.resolution.planar_cells() < DIRECT_SOLVE_CELL_LIMIT;
    if inputs.force_direct_solve || small_planar {
        SolverFamily::Direct
    } else {
        SolverFamily::Multigrid
    }
}

/// Number of times `elements` halves evenly. `None` for an absent (zero) axis,
/// which places no bound on the depth.
pub const fn axis_multigrid_depth(elements: u32) -> Option<u32> {
    if elements == 0 {
        None
    } else {
        Some(elements.trailing_zeros())
    }
}

pub fn max_multigrid_level(resolution: &Resolution) -> Option<u32> {
    Axis::ALL
        .iter()
        .filter_map(|axis| axis_multigrid_depth(resolution.get(*axis)))
        .min()
}

pub fn select_solver(inputs: &SolverInputs, simulation_root: &Path) -> LmrResult<SolverPlan> {
    let family = choose_family(inputs);
    let plan = match family {
        SolverFamily::Direct => SolverPlan {
            family,
            multigrid_level: None,
            flags: DIRECT_FLAGS.iter().map(|flag| flag.to_string()).collect(),
            extra_descriptors: Vec::new(),
        },
        SolverFamily::Multigrid => {
            let level = multigrid_level(inputs)?;
            let mut flags = Vec::with_capacity(MULTIGRID_FLAGS.len() + 1);
            flags.push(format!("--mgLevels={}", level));
            flags.extend(MULTIGRID_FLAGS.iter().map(|flag| flag.to_string()));
            SolverPlan {
                family,
                multigrid_level: Some(level),
                flags,
                extra_descriptors: vec![simulation_root.join(MULTIGRID_DESCRIPTOR)],
            }
        }
    };

    info!(
        solver = family.as_str(),
        level = ?plan.multigrid_level,
        resolution = %inputs.resolution,
        "selected solver"
    );
    Ok(plan)
}

fn multigrid_level(inputs: &SolverInputs) -> LmrResult<u32> {
    let max_level = max_multigrid_level(&inputs.resolution).ok_or_else(|| {
        LmrError::configuration(
            "CONFIG.MULTIGRID_RESOLUTION",
            format!(
                "a multigrid solve needs at least one non-zero axis, resolution is {}",
                inputs.resolution
            ),
        )
    })?;

    match inputs.forced_multigrid_level {
        0 => Ok(max_level),
        forced if forced <= max_level => Ok(forced),
        forced => Err(LmrError::configuration(
            "CONFIG.MULTIGRID_LEVEL_TOO_HIGH",
            format!(
                "force_multigrid_level_to_be is {} but resolution {} allows at most {}",
                forced, inputs.resolution, max_level
            ),
        )),
    }
}

use super::defaults::OptionalDefaults;
use super::tree::{ConfigTree, Section};
use crate::domain::{Dimensionality, LmrError, LmrResult, Resolution, RestartStep};
use crate::model::{ModelParameters, ParallelLauncher, RunControls, SolverStage};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const OUTPUT_CONTROLS: &str = "Output_Controls";
pub const THERMAL_EQUILIBRATION: &str = "Thermal_Equilibration";
pub const RESTARTING_CONTROLS: &str = "Restarting_Controls";
pub const SOLVER_DETAILS: &str = "Solver_Details";
pub const UNDERWORLD_EXECUTION: &str = "Underworld_Execution";

pub const STAGING_DIR_NAME: &str = "xmls";

pub fn normalize(tree: &ConfigTree, job_dir: &Path) -> LmrResult<ModelParameters> {
    normalize_with_defaults(tree, job_dir, &OptionalDefaults::default())
}

/// Converts the raw job tree into a typed record. Relative paths in the tree
/// resolve against `job_dir`; nothing is written to disk.
pub fn normalize_with_defaults(
    tree: &ConfigTree,
    job_dir: &Path,
    defaults: &OptionalDefaults,
) -> LmrResult<ModelParameters> {
    let root = tree.root();

    let output = root.section(OUTPUT_CONTROLS)?;
    let main = run_controls(&output, "model_resolution")?;
    let output_pictures = output.flag("output_pictures")?;
    let write_log = output.flag("write_log_file")?;

    let thermal_section = root.section(THERMAL_EQUILIBRATION)?;
    let run_thermal_phase = thermal_section.flag("run_thermal_equilibration_phase")?;
    let update_xml_information = thermal_section.flag("update_xml_information")?;
    let preserve_thermal_checkpoints =
        thermal_section.flag("preserve_thermal_equilibration_checkpoints")?;
    let mut thermal = run_controls(
        &thermal_section.section("output_controls")?,
        "thermal_model_resolution",
    )?;

    let dimensionality = resolve_dimensionality(&main.resolution, &mut thermal.resolution)?;

    let restarting = root.section(RESTARTING_CONTROLS)?;
    let restart = restarting.flag("restart")?;
    let restart_step = match restarting.optional_integer::<u32>("restart_from_step")? {
        Some(step) => RestartStep::Explicit(step),
        None => defaults.restart_step,
    };

    let solver = root.section(SOLVER_DETAILS)?;
    let linear_solver = solver_stage(&solver.section("linear_solver")?)?;
    let mut nonlinear_solver = solver_stage(&solver.section("nonLinear_solver")?)?;
    if run_thermal_phase {
        // equilibration is pure diffusion; one nonlinear pass is enough
        nonlinear_solver.max_iterations = 1;
    }
    let forced_multigrid_level = solver.integer::<u32>("force_multigrid_level_to_be")?;
    let force_direct_solve = solver.flag("force_direct_solve")?;
    let force_multigrid_solve = solver.flag("force_multigrid_solve")?;
    if force_direct_solve && force_multigrid_solve {
        return Err(LmrError::configuration(
            "CONFIG.SOLVER_FORCE_CONFLICT",
            format!(
                "cannot force a direct solve and also force a multigrid solve; set at most one of \
                 force_direct_solve / force_multigrid_solve to true in <{}>",
                SOLVER_DETAILS
            ),
        ));
    }

    let execution = root.section(UNDERWORLD_EXECUTION)?;
    let binary_path = resolve_binary(&execution, job_dir)?;
    let simulation_root = simulation_root_for(&binary_path)?;
    let launcher = parallel_launcher(&execution, defaults)?;
    let extra_flags = execution
        .optional("extra_command_line_flags")?
        .map(str::to_string)
        .unwrap_or_else(|| defaults.extra_command_line_flags.clone());
    let verbose = execution
        .optional_flag("verbose_run")?
        .unwrap_or(defaults.verbose_run);

    let model_output_path = job_dir.join(format!("result_{}", main.labelled_description()));
    let thermal_output_path = job_dir.join(format!(
        "initial-condition_{}",
        thermal.labelled_description()
    ));
    let xmls_dir = if run_thermal_phase {
        thermal_output_path.join(STAGING_DIR_NAME)
    } else {
        model_output_path.join(STAGING_DIR_NAME)
    };

    debug!(
        dims = dimensionality.as_u8(),
        thermal = run_thermal_phase,
        restart,
        "normalized job configuration"
    );

    Ok(ModelParameters {
        main,
        thermal,
        linear_solver,
        nonlinear_solver,
        run_thermal_phase,
        write_log,
        output_pictures,
        restart,
        force_direct_solve,
        force_multigrid_solve,
        update_xml_information,
        preserve_thermal_checkpoints,
        verbose,
        restart_step,
        forced_multigrid_level,
        binary_path,
        simulation_root,
        launcher,
        extra_flags,
        job_dir: job_dir.to_path_buf(),
        model_output_path,
        thermal_output_path,
        xmls_dir,
        dimensionality,
        multigrid_level: None,
        restart_timestep: None,
    })
}

/// Planar main meshes force a planar thermal mesh; a volumetric main mesh
/// needs a volumetric thermal mesh to start from.
pub fn resolve_dimensionality(
    main: &Resolution,
    thermal: &mut Resolution,
) -> LmrResult<Dimensionality> {
    if main.is_planar() {
        thermal.z = 0;
        return Ok(Dimensionality::Two);
    }
    if thermal.is_planar() {
        return Err(LmrError::configuration(
            "CONFIG.THERMAL_DIMENSIONALITY",
            format!(
                "<model_resolution> asks for a 3D model ({}) but <thermal_model_resolution> in \
                 <{}> is 2D ({}); give the thermal resolution a non-zero z",
                main, THERMAL_EQUILIBRATION, thermal
            ),
        ));
    }
    Ok(Dimensionality::Three)
}

fn run_controls(section: &Section<'_>, resolution_key: &str) -> LmrResult<RunControls> {
    let resolution_section = section.section(resolution_key)?;
    let resolution = Resolution::new(
        resolution_section.integer("x")?,
        resolution_section.integer("y")?,
        resolution_section.integer("z")?,
    );

    let duration = section.section("experiment_duration_options")?;
    let checkpoints = section.section("checkpoint_frequency_options")?;

    Ok(RunControls {
        description: section.required("description")?.to_string(),
        resolution,
        max_timesteps: duration.integer("maximum_timesteps")?,
        max_time: duration.float("maximum_time_in_years")?,
        checkpoint_every_x_years: checkpoints.float("every_x_years")?,
        checkpoint_every_x_steps: checkpoints.integer("every_x_timesteps")?,
    })
}

fn solver_stage(section: &Section<'_>) -> LmrResult<SolverStage> {
    Ok(SolverStage {
        tolerance: section.float("tolerance")?,
        min_iterations: section.integer("min_iterations")?,
        max_iterations: section.integer("max_iterations")?,
    })
}

fn resolve_binary(execution: &Section<'_>, job_dir: &Path) -> LmrResult<PathBuf> {
    let raw = execution.required("Underworld_binary")?;
    let path = Path::new(raw);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        job_dir.join(path)
    };

    if !resolved.exists() {
        return Err(LmrError::configuration(
            "CONFIG.BINARY_MISSING",
            format!(
                "the simulation binary does not exist; <{}>/Underworld_binary is '{}' (resolved to '{}')",
                UNDERWORLD_EXECUTION,
                raw,
                resolved.display()
            ),
        ));
    }
    Ok(resolved)
}

/// The install root sits two directories above the one holding the binary
/// (`<root>/build/bin/Underworld`).
fn simulation_root_for(binary_path: &Path) -> LmrResult<PathBuf> {
    binary_path
        .parent()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .filter(|root| !root.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            LmrError::configuration(
                "CONFIG.SIMULATION_ROOT",
                format!(
                    "cannot find the install root of '{}'; <{}>/Underworld_binary must point at \
                     <root>/build/bin/Underworld",
                    binary_path.display(),
                    UNDERWORLD_EXECUTION
                ),
            )
        })
}

fn parallel_launcher(
    execution: &Section<'_>,
    defaults: &OptionalDefaults,
) -> LmrResult<ParallelLauncher> {
    let command = execution
        .optional("parallel_command")?
        .map(str::to_string)
        .unwrap_or_else(|| defaults.parallel_command.clone());
    let cpu_flag = execution
        .optional("parallel_command_cpu_flag")?
        .map(str::to_string)
        .unwrap_or_else(|| defaults.parallel_command_cpu_flag.clone());
    let cpus = if execution.flag("supercomputer_mpi_format")? {
        None
    } else {
        Some(execution.required("CPUs")?.to_string())
    };

    Ok(ParallelLauncher {
        command,
        cpu_flag,
        cpus,
    })
}

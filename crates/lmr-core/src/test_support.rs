use crate::config::{ConfigTree, normalize};
use crate::model::ModelParameters;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

/// Creates `<root>/underworld/build/bin/Underworld` so the binary-exists check
/// passes and the simulation root resolves to `<root>/underworld`.
pub(crate) fn stage_binary(root: &Path) -> PathBuf {
    let bin_dir = root.join("underworld/build/bin");
    fs::create_dir_all(&bin_dir).expect("binary dir should be created");
    let binary = bin_dir.join("Underworld");
    fs::write(&binary, "#!/bin/sh\nexit 0\n").expect("binary stand-in should be written");
    binary
}

pub(crate) fn sample_job(binary: &Path) -> Value {
    json!({
        "Output_Controls": {
            "description": "demo",
            "output_pictures": "false",
            "write_log_file": "false",
            "model_resolution": { "x": "50", "y": "50", "z": "0" },
            "experiment_duration_options": {
                "maximum_timesteps": "100",
                "maximum_time_in_years": "5e6"
            },
            "checkpoint_frequency_options": {
                "every_x_years": "1e5",
                "every_x_timesteps": "10"
            }
        },
        "Thermal_Equilibration": {
            "run_thermal_equilibration_phase": "false",
            "update_xml_information": "false",
            "preserve_thermal_equilibration_checkpoints": "false",
            "output_controls": {
                "description": "therm",
                "thermal_model_resolution": { "x": "25", "y": "25", "z": "0" },
                "experiment_duration_options": {
                    "maximum_timesteps": "20",
                    "maximum_time_in_years": "1e9"
                },
                "checkpoint_frequency_options": {
                    "every_x_years": "1e7",
                    "every_x_timesteps": "5"
                }
            }
        },
        "Restarting_Controls": { "restart": "false" },
        "Solver_Details": {
            "linear_solver": { "tolerance": "1e-5", "min_iterations": "1", "max_iterations": "500" },
            "nonLinear_solver": { "tolerance": "1e-3", "min_iterations": "2", "max_iterations": "50" },
            "force_multigrid_level_to_be": "0",
            "force_direct_solve": "false",
            "force_multigrid_solve": "false"
        },
        "Underworld_Execution": {
            "Underworld_binary": binary.to_string_lossy(),
            "supercomputer_mpi_format": "false",
            "CPUs": "4"
        }
    })
}

/// Sets a nested value, e.g. `set(&mut job, &["Output_Controls", "model_resolution", "z"], "8")`.
pub(crate) fn set(job: &mut Value, path: &[&str], value: impl Into<Value>) {
    let (last, parents) = path.split_last().expect("path should not be empty");
    let mut node = job;
    for key in parents {
        node = node
            .get_mut(*key)
            .unwrap_or_else(|| panic!("fixture section '{}' should exist", key));
    }
    node.as_object_mut()
        .expect("parent should be an object")
        .insert((*last).to_string(), value.into());
}

pub(crate) fn remove(job: &mut Value, path: &[&str]) {
    let (last, parents) = path.split_last().expect("path should not be empty");
    let mut node = job;
    for key in parents {
        node = node
            .get_mut(*key)
            .unwrap_or_else(|| panic!("fixture section '{}' should exist", key));
    }
    node.as_object_mut()
        .expect("parent should be an object")
        .remove(*last);
}

pub(crate) fn parameters_for(job: Value, job_dir: &Path) -> ModelParameters {
    let tree = ConfigTree::from_json_value(job).expect("fixture tree should convert");
    normalize(&tree, job_dir).expect("fixture job should normalize")
}

/// Writes empty checkpoint markers `VelocityField.<ts:05>.h5` for each step.
pub(crate) fn write_checkpoints(dir: &Path, timesteps: &[u32]) {
    fs::create_dir_all(dir).expect("checkpoint dir should be created");
    for timestep in timesteps {
        fs::write(dir.join(format!("VelocityField.{:05}.h5", timestep)), b"")
            .expect("checkpoint marker should be written");
    }
}

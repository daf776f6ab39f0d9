//! Checkpoint discovery, restart resolution and descriptor staging.

mod checkpoint;
mod initials;
mod staging;

pub use checkpoint::{
    CHECKPOINT_FIELD, CHECKPOINT_PATTERN, CheckpointSet, checkpoint_file_name, find_last_timestep,
};
pub use initials::{
    INITIAL_MESH_FILE, INITIALS_DESCRIPTOR, MESH_PLACEHOLDER, TEMPERATURE_FIELD,
    TEMPERATURE_PLACEHOLDER, rewrite_initial_condition, substitute_placeholders,
};
pub use staging::{
    DESCRIPTOR_EXTENSION, RESTART_STAGING_PREFIX, next_staging_dir, stage_descriptors,
};

use crate::domain::{LmrError, LmrResult, Phase, RestartStep};
use crate::model::ModelParameters;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestep a restart resumes from. An explicit request must name the latest
/// checkpoint on disk.
pub fn resolve_restart_timestep(
    output_dir: &Path,
    requested: RestartStep,
) -> LmrResult<u32> {
    let latest = find_last_timestep(output_dir)?;
    match requested {
        RestartStep::Auto => Ok(latest),
        RestartStep::Explicit(step) if step == latest => Ok(step),
        RestartStep::Explicit(step) => Err(LmrError::configuration(
            "CONFIG.RESTART_MISMATCH",
            format!(
                "restart_timestep is {} but the latest checkpoint in '{}' is {}; restarting from \
                 an earlier checkpoint is not supported",
                step,
                output_dir.display(),
                latest
            ),
        )),
    }
}

/// Filesystem state established before launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingReport {
    pub staging_dir: PathBuf,
    pub staged_descriptors: Vec<PathBuf>,
    pub restart_timestep: Option<u32>,
    pub initial_condition_timestep: Option<u32>,
}

/// Creates the output directory, resolves the restart point, stages the job's
/// descriptors and, for production runs that ask for it, points the staged
/// initial condition at the latest thermal checkpoint. Completes
/// `xmls_dir` and `restart_timestep` on `params`.
pub fn prepare_output(params: &mut ModelParameters) -> LmrResult<StagingReport> {
    let output_dir = params.output_path().to_path_buf();
    fs::create_dir_all(&output_dir).map_err(|source| {
        LmrError::internal(
            "SYS.OUTPUT_DIRECTORY",
            format!(
                "failed to create output directory '{}': {}",
                output_dir.display(),
                source
            ),
        )
    })?;

    let restart_timestep = if params.restart {
        let step = resolve_restart_timestep(&output_dir, params.restart_step)?;
        info!(timestep = step, output = %output_dir.display(), "restarting");
        Some(step)
    } else {
        None
    };
    params.restart_timestep = restart_timestep;

    let staging_dir = next_staging_dir(&output_dir, params.restart)?;
    let staged_descriptors = stage_descriptors(&params.job_dir, &staging_dir)?;
    params.xmls_dir = staging_dir.clone();

    let initial_condition_timestep =
        if params.phase() == Phase::Production && params.update_xml_information {
            let thermal_step = find_last_timestep(&params.thermal_output_path)?;
            rewrite_initial_condition(&staging_dir, &params.thermal_output_path, thermal_step)?;
            Some(thermal_step)
        } else {
            None
        };

    Ok(StagingReport {
        staging_dir,
        staged_descriptors,
        restart_timestep,
        initial_condition_timestep,
    })
}

#[cfg(test)]
mod tests {
    use super::{prepare_output, resolve_restart_timestep};
    use crate::domain::{LmrErrorCategory, RestartStep};
    use crate::test_support::{parameters_for, sample_job, set, stage_binary, write_checkpoints};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn automatic_restart_uses_latest_checkpoint() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_checkpoints(temp.path(), &[10, 25, 40]);
        assert_eq!(
            resolve_restart_timestep(temp.path(), RestartStep::Auto).expect("auto restart"),
            40
        );
        assert_eq!(
            resolve_restart_timestep(temp.path(), RestartStep::Explicit(40))
                .expect("explicit latest"),
            40
        );
    }

    #[test]
    fn explicit_restart_before_latest_is_rejected() {
        let temp = TempDir::new().expect("tempdir should be created");
        write_checkpoints(temp.path(), &[10, 25, 40]);
        let error = resolve_restart_timestep(temp.path(), RestartStep::Explicit(25))
            .expect_err("older checkpoint should fail");
        assert_eq!(error.category(), LmrErrorCategory::Configuration);
        assert_eq!(error.code(), "CONFIG.RESTART_MISMATCH");
        assert!(error.message().contains("40"));
    }

    #[test]
    fn restart_without_checkpoints_is_not_found() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = resolve_restart_timestep(temp.path(), RestartStep::Auto)
            .expect_err("no checkpoints should fail");
        assert_eq!(error.code(), "NOTFOUND.CHECKPOINTS");
    }

    #[test]
    fn fresh_production_run_stages_into_xmls() {
        let temp = TempDir::new().expect("tempdir should be created");
        let binary = stage_binary(temp.path());
        let job_dir = temp.path().join("job");
        fs::create_dir_all(&job_dir).expect("job dir");
        fs::write(job_dir.join("lmrMain.xml"), "<main/>").expect("main descriptor");

        let mut params = parameters_for(sample_job(&binary), &job_dir);
        let report = prepare_output(&mut params).expect("preparation should succeed");

        let expected = job_dir.join("result_50x50x0_demo/xmls");
        assert_eq!(report.staging_dir, expected);
        assert_eq!(params.xmls_dir, expected);
        assert!(expected.join("lmrMain.xml").is_file());
        assert_eq!(report.restart_timestep, None);
        assert_eq!(report.initial_condition_timestep, None);
    }

    #[test]
    fn restart_stages_versioned_copy_and_records_timestep() {
        let temp = TempDir::new().expect("tempdir should be created");
        let binary = stage_binary(temp.path());
        let job_dir = temp.path().join("job");
        fs::create_dir_all(&job_dir).expect("job dir");
        fs::write(job_dir.join("lmrMain.xml"), "<main/>").expect("main descriptor");

        let output = job_dir.join("result_50x50x0_demo");
        write_checkpoints(&output, &[10, 20]);
        fs::create_dir_all(output.join("xmls")).expect("earlier staging");

        let mut job = sample_job(&binary);
        set(&mut job, &["Restarting_Controls", "restart"], "true");
        let mut params = parameters_for(job, &job_dir);
        let report = prepare_output(&mut params).expect("restart preparation");

        assert_eq!(report.staging_dir, output.join("xmls_restart_1"));
        assert_eq!(params.restart_timestep, Some(20));
    }

    #[test]
    fn production_run_rewrites_initial_condition_from_thermal_output() {
        let temp = TempDir::new().expect("tempdir should be created");
        let binary = stage_binary(temp.path());
        let job_dir = temp.path().join("job");
        fs::create_dir_all(&job_dir).expect("job dir");
        fs::write(
            job_dir.join("lmrInitials.xml"),
            "<t>!!PATH_TO_TEMP_FILE!!</t><m>!!PATH_TO_MESH_FILE!!</m>",
        )
        .expect("initials descriptor");

        let thermal = job_dir.join("initial-condition_25x25x0_therm");
        write_checkpoints(&thermal, &[5, 15]);

        let mut job = sample_job(&binary);
        set(
            &mut job,
            &["Thermal_Equilibration", "update_xml_information"],
            "true",
        );
        let mut params = parameters_for(job, &job_dir);
        let report = prepare_output(&mut params).expect("preparation should succeed");

        assert_eq!(report.initial_condition_timestep, Some(15));
        let staged = fs::read_to_string(report.staging_dir.join("lmrInitials.xml"))
            .expect("staged initials");
        assert!(staged.contains("TemperatureField.00015.h5"));
        assert!(staged.contains("Mesh.linearMesh.00000.h5"));
        assert_eq!(
            fs::read_to_string(job_dir.join("lmrInitials.xml")).expect("job initials"),
            "<t>!!PATH_TO_TEMP_FILE!!</t><m>!!PATH_TO_MESH_FILE!!</m>"
        );
    }

    #[test]
    fn production_rewrite_without_thermal_output_fails() {
        let temp = TempDir::new().expect("tempdir should be created");
        let binary = stage_binary(temp.path());
        let job_dir = temp.path().join("job");
        fs::create_dir_all(&job_dir).expect("job dir");

        let mut job = sample_job(&binary);
        set(
            &mut job,
            &["Thermal_Equilibration", "update_xml_information"],
            "true",
        );
        let mut params = parameters_for(job, &job_dir);
        let error = prepare_output(&mut params).expect_err("missing thermal output should fail");
        assert_eq!(error.code(), "NOTFOUND.OUTPUT_DIRECTORY");
    }
}

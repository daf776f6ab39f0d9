use super::checkpoint::checkpoint_file_name;
use crate::domain::{LmrError, LmrResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

pub const INITIALS_DESCRIPTOR: &str = "lmrInitials.xml";
pub const TEMPERATURE_PLACEHOLDER: &str = "!!PATH_TO_TEMP_FILE!!";
pub const MESH_PLACEHOLDER: &str = "!!PATH_TO_MESH_FILE!!";
pub const TEMPERATURE_FIELD: &str = "TemperatureField";
pub const INITIAL_MESH_FILE: &str = "Mesh.linearMesh.00000.h5";

/// Replaces both placeholders everywhere in `content`. Nothing is substituted
/// unless both are present.
pub fn substitute_placeholders(
    content: &str,
    temperature_file: &str,
    mesh_file: &str,
) -> LmrResult<String> {
    for placeholder in [TEMPERATURE_PLACEHOLDER, MESH_PLACEHOLDER] {
        if !content.contains(placeholder) {
            return Err(LmrError::structural(
                "STRUCT.MISSING_PLACEHOLDER",
                format!(
                    "{} does not contain '{}'; the initial condition descriptor must carry both \
                     '{}' and '{}'",
                    INITIALS_DESCRIPTOR, placeholder, TEMPERATURE_PLACEHOLDER, MESH_PLACEHOLDER
                ),
            ));
        }
    }

    Ok(content
        .replace(TEMPERATURE_PLACEHOLDER, temperature_file)
        .replace(MESH_PLACEHOLDER, mesh_file))
}

/// Points the staged `lmrInitials.xml` at the temperature checkpoint of
/// `last_timestep` and the initial mesh, both under `thermal_output_path`.
/// The descriptor is replaced atomically.
pub fn rewrite_initial_condition(
    staging_dir: &Path,
    thermal_output_path: &Path,
    last_timestep: u32,
) -> LmrResult<PathBuf> {
    let target = staging_dir.join(INITIALS_DESCRIPTOR);
    let content = fs::read_to_string(&target).map_err(|source| {
        LmrError::not_found(
            "NOTFOUND.INITIALS_DESCRIPTOR",
            format!("failed to read '{}': {}", target.display(), source),
        )
    })?;

    let temperature_file =
        thermal_output_path.join(checkpoint_file_name(TEMPERATURE_FIELD, last_timestep));
    let mesh_file = thermal_output_path.join(INITIAL_MESH_FILE);
    let rewritten = substitute_placeholders(
        &content,
        &temperature_file.to_string_lossy(),
        &mesh_file.to_string_lossy(),
    )?;

    write_atomically(staging_dir, &target, rewritten.as_bytes())?;
    info!(
        descriptor = %target.display(),
        temperature = %temperature_file.display(),
        "updated initial condition descriptor"
    );
    Ok(target)
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> LmrResult<()> {
    let io_error = |source: std::io::Error| {
        LmrError::internal(
            "SYS.INITIALS_WRITE",
            format!("failed to write '{}': {}", target.display(), source),
        )
    };

    let mut staged = NamedTempFile::new_in(dir).map_err(io_error)?;
    staged.write_all(bytes).map_err(io_error)?;
    staged.as_file().sync_all().map_err(io_error)?;
    staged
        .persist(target)
        .map_err(|persist| io_error(persist.error))?;
    Ok(())
}

use crate::domain::{LmrResult, Phase};
use crate::model::ModelParameters;
use crate::restart::{INITIAL_MESH_FILE, find_last_timestep};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name endings that survive equilibration cleanup regardless of timestep.
pub const KEPT_SUFFIXES: [&str; 5] = ["xml", "xdmf", "dat", "txt", "list"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub last_timestep: u32,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

pub fn is_kept(file_name: &str, last_timestep: u32) -> bool {
    file_name.contains(&format!(".{:05}.", last_timestep))
        || file_name == INITIAL_MESH_FILE
        || KEPT_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
}

/// Deletes every plain file in `dir` that [`is_kept`] rejects. Failures are
/// recorded and skipped.
pub fn prune_checkpoints(dir: &Path, last_timestep: u32) -> CleanupReport {
    let mut report = CleanupReport {
        last_timestep,
        ..CleanupReport::default()
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            debug!(dir = %dir.display(), error = %source, "cleanup skipped");
            return report;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if is_kept(name, last_timestep) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => report.removed.push(path),
            Err(source) => {
                debug!(file = %path.display(), error = %source, "could not remove checkpoint");
                report.failed.push(path);
            }
        }
    }

    report.removed.sort();
    report.failed.sort();
    report
}

/// Equilibration runs keep only the final checkpoint unless told to preserve
/// them all. Production runs are never pruned.
pub fn post_run_cleanup(params: &ModelParameters) -> LmrResult<Option<CleanupReport>> {
    if params.phase() != Phase::Equilibration || params.preserve_thermal_checkpoints {
        return Ok(None);
    }

    let output = params.output_path();
    let last_timestep = find_last_timestep(output)?;
    let report = prune_checkpoints(output, last_timestep);
    info!(
        kept_timestep = last_timestep,
        removed = report.removed.len(),
        "pruned equilibration checkpoints"
    );
    Ok(Some(report))
}

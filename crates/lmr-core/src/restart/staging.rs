use crate::config::STAGING_DIR_NAME;
use crate::domain::{LmrError, LmrResult};
use globset::Glob;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const RESTART_STAGING_PREFIX: &str = "xmls_restart_";
pub const DESCRIPTOR_EXTENSION: &str = ".xml";

/// Staging directory for this invocation's descriptors.
///
/// Fresh runs (and restarts of a run that never staged anything) use `xmls/`.
/// Every other restart gets `xmls_restart_<n>`, where `n` is the number of
/// staging directories already present, bumped past the highest existing
/// suffix so a directory left behind by an interrupted run is never reused.
pub fn next_staging_dir(output_dir: &Path, restarting: bool) -> LmrResult<PathBuf> {
    let initial = output_dir.join(STAGING_DIR_NAME);
    if !restarting {
        return Ok(initial);
    }

    let existing = existing_staging_dirs(output_dir)?;
    if existing.is_empty() {
        return Ok(initial);
    }

    let highest_suffix = existing
        .iter()
        .filter_map(|name| name.strip_prefix(RESTART_STAGING_PREFIX))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let count = u32::try_from(existing.len()).unwrap_or(u32::MAX);
    let version = count.max(highest_suffix.saturating_add(1));

    Ok(output_dir.join(format!("{}{}", RESTART_STAGING_PREFIX, version)))
}

fn existing_staging_dirs(output_dir: &Path) -> LmrResult<Vec<String>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }

    let matcher = Glob::new(&format!("{}*", STAGING_DIR_NAME))
        .map(|glob| glob.compile_matcher())
        .map_err(|source| {
            LmrError::internal(
                "SYS.STAGING_PATTERN",
                format!("invalid staging directory pattern: {}", source),
            )
        })?;

    let entries = fs::read_dir(output_dir).map_err(|source| {
        LmrError::internal(
            "SYS.OUTPUT_DIRECTORY_READ",
            format!("failed to list '{}': {}", output_dir.display(), source),
        )
    })?;

    let mut names = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| matcher.is_match(name))
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Copies every `*.xml` descriptor in `source_dir` into `staging_dir`,
/// creating it if needed. Returns the staged paths in name order.
pub fn stage_descriptors(source_dir: &Path, staging_dir: &Path) -> LmrResult<Vec<PathBuf>> {
    fs::create_dir_all(staging_dir).map_err(|source| {
        LmrError::internal(
            "SYS.STAGING_DIRECTORY",
            format!(
                "failed to create staging directory '{}': {}",
                staging_dir.display(),
                source
            ),
        )
    })?;

    let entries = fs::read_dir(source_dir).map_err(|source| {
        LmrError::not_found(
            "NOTFOUND.JOB_DIRECTORY",
            format!(
                "failed to list job directory '{}': {}",
                source_dir.display(),
                source
            ),
        )
    })?;

    let mut descriptors = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(DESCRIPTOR_EXTENSION))
        })
        .collect::<Vec<_>>();
    descriptors.sort();

    let mut staged = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let Some(file_name) = descriptor.file_name() else {
            continue;
        };
        let destination = staging_dir.join(file_name);
        fs::copy(&descriptor, &destination).map_err(|source| {
            LmrError::internal(
                "SYS.STAGING_COPY",
                format!(
                    "failed to copy '{}' into '{}': {}",
                    descriptor.display(),
                    staging_dir.display(),
                    source
                ),
            )
        })?;
        debug!(descriptor = %destination.display(), "staged descriptor");
        staged.push(destination);
    }

    Ok(staged)
}

use crate::domain::{LmrError, LmrResult};
use globset::{Glob, GlobMatcher};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Field whose checkpoint files mark a completed timestep.
pub const CHECKPOINT_FIELD: &str = "VelocityField";
pub const CHECKPOINT_PATTERN: &str = "VelocityField.*.h5";

/// `<field>.<timestep:05>.h5`
pub fn checkpoint_file_name(field: &str, timestep: u32) -> String {
    format!("{}.{:05}.h5", field, timestep)
}

/// Completed timesteps found under one output directory. Always built from a
/// fresh directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSet {
    dir: PathBuf,
    timesteps: BTreeSet<u32>,
}

impl CheckpointSet {
    /// Fails only when `dir` does not exist; a directory without checkpoints
    /// yields an empty set.
    pub fn scan(dir: impl AsRef<Path>) -> LmrResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LmrError::not_found(
                "NOTFOUND.OUTPUT_DIRECTORY",
                format!(
                    "looking for folder '{}' but it does not exist; this happens when the initial \
                     condition was never produced (run the thermal equilibration phase first) or \
                     when restarting a model that never ran",
                    dir.display()
                ),
            ));
        }

        let matcher = checkpoint_matcher()?;
        let entries = fs::read_dir(dir).map_err(|source| {
            LmrError::internal(
                "SYS.OUTPUT_DIRECTORY_READ",
                format!("failed to list '{}': {}", dir.display(), source),
            )
        })?;

        let mut timesteps = BTreeSet::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !matcher.is_match(name) {
                continue;
            }
            if let Some(timestep) = timestep_from_name(name) {
                timesteps.insert(timestep);
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            timesteps,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn latest(&self) -> Option<u32> {
        self.timesteps.last().copied()
    }

    pub fn contains(&self, timestep: u32) -> bool {
        self.timesteps.contains(&timestep)
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }

    pub fn timesteps(&self) -> impl Iterator<Item = u32> + '_ {
        self.timesteps.iter().copied()
    }
}

/// Latest completed timestep in `dir`.
pub fn find_last_timestep(dir: impl AsRef<Path>) -> LmrResult<u32> {
    let set = CheckpointSet::scan(dir)?;
    set.latest().ok_or_else(|| {
        LmrError::not_found(
            "NOTFOUND.CHECKPOINTS",
            format!(
                "no files like '{}' in '{}'; for a run from scratch the thermal equilibration \
                 phase may need to run (or run longer), and for a restart the <description> must \
                 match the previous model",
                CHECKPOINT_PATTERN,
                set.dir().display()
            ),
        )
    })
}

fn checkpoint_matcher() -> LmrResult<GlobMatcher> {
    Glob::new(CHECKPOINT_PATTERN)
        .map(|glob| glob.compile_matcher())
        .map_err(|source| {
            LmrError::internal(
                "SYS.CHECKPOINT_PATTERN",
                format!("invalid checkpoint pattern '{}': {}", CHECKPOINT_PATTERN, source),
            )
        })
}

/// Timestep is the second-to-last dot-separated chunk: `VelocityField.00475.h5`.
fn timestep_from_name(name: &str) -> Option<u32> {
    let mut chunks = name.rsplit('.');
    chunks.next()?;
    chunks.next()?.parse().ok()
}

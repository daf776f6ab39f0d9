mod defaults;
mod normalize;
mod tree;

pub use defaults::{DEFAULT_PARALLEL_COMMAND, DEFAULT_PARALLEL_CPU_FLAG, OptionalDefaults};
pub use normalize::{
    OUTPUT_CONTROLS, RESTARTING_CONTROLS, SOLVER_DETAILS, STAGING_DIR_NAME, THERMAL_EQUILIBRATION,
    UNDERWORLD_EXECUTION, normalize, normalize_with_defaults, resolve_dimensionality,
};
pub use tree::{ConfigTree, ConfigTreeError, Section};

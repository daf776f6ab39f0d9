use crate::domain::RestartStep;

pub const DEFAULT_PARALLEL_COMMAND: &str = "mpirun";
pub const DEFAULT_PARALLEL_CPU_FLAG: &str = "-np";

/// Declared fallbacks for every optional job field. The normalizer consults
/// this once; nothing downstream re-checks for absent keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalDefaults {
    pub restart_step: RestartStep,
    pub parallel_command: String,
    pub parallel_command_cpu_flag: String,
    /// Appended as one unsplit argument.
    pub extra_command_line_flags: String,
    pub verbose_run: bool,
}

impl Default for OptionalDefaults {
    fn default() -> Self {
        Self {
            restart_step: RestartStep::Auto,
            parallel_command: DEFAULT_PARALLEL_COMMAND.to_string(),
            parallel_command_cpu_flag: DEFAULT_PARALLEL_CPU_FLAG.to_string(),
            extra_command_line_flags: String::new(),
            verbose_run: false,
        }
    }
}

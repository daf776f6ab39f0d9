//! Ordered argv assembly from the resolved job record.
//!
//! Every argument family is a template entry keyed by a logical name. The
//! launcher prefix, the binary and the input descriptors are pulled out first,
//! the remaining entries follow in name order, and the user's extra flags close
//! the line as a single token.

use crate::domain::{Axis, LmrError, LmrResult, Phase};
use crate::model::{ModelParameters, SolverStage};
use crate::solver::SolverPlan;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::Command;

pub const MAIN_DESCRIPTOR: &str = "lmrMain.xml";
pub const THERMAL_DESCRIPTOR: &str = "lmrThermalEquilibration.xml";
pub const DISABLE_WINDOW_FLAG: &str = "--components.window.Type=DummyComponent";

const PARALLEL_RUNNER: &str = "parallel_runner";
const BINARY: &str = "uwbinary";
const INPUT_XMLS: &str = "input_xmls";
const EXTRA_FLAGS: &str = "extra_command_line_flags";

/// Value a template placeholder can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Scalar(String),
    /// Expands into one argv entry per item when it fills a whole token.
    List(Vec<String>),
    /// Addressed as `{name[key]}`.
    Keyed(BTreeMap<String, String>),
}

impl TemplateValue {
    fn scalar(value: impl ToString) -> Self {
        Self::Scalar(value.to_string())
    }
}

pub type TemplateFields = BTreeMap<String, TemplateValue>;

/// Logical argument name to parameterized pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandTemplate {
    entries: BTreeMap<String, String>,
}

impl CommandTemplate {
    /// Entries for one job: the fixed argument families plus the optional ones
    /// (`output_pictures`, `restart`) the record switches on.
    pub fn for_job(params: &ModelParameters, plan: &SolverPlan) -> Self {
        let mut template = Self::default();

        // A blank launcher means a serial run: no prefix at all.
        if !params.launcher.command.trim().is_empty() {
            let runner = if params.launcher.cpus.is_some() {
                "{parallel_command} {parallel_command_cpu_flag} {cpus}"
            } else {
                "{parallel_command}"
            };
            template.insert(PARALLEL_RUNNER, runner);
        }
        template.insert(BINARY, "{uwbinary}");
        template.insert(INPUT_XMLS, "{input_xmls}");
        template.insert(
            "resolution",
            "--elementResI={resolution[x]} --elementResJ={resolution[y]} --elementResK={resolution[z]}",
        );
        template.insert("dims", "--dim={dims}");
        template.insert("output_path", "--outputPath={output_path}");
        if !params.output_pictures {
            template.insert("output_pictures", DISABLE_WINDOW_FLAG);
        }
        template.insert("max_time", "--end={max_time}");
        template.insert("max_timesteps", "--maxTimeSteps={max_timesteps}");
        template.insert(
            "checkpoint_every_x_years",
            "--checkpointAtTimeInc={checkpoint_every_x_years}",
        );
        template.insert(
            "checkpoint_every_x_steps",
            "--checkpointEvery={checkpoint_every_x_steps}",
        );
        if params.restart_timestep.is_some() {
            template.insert("restart", "--restartTimestep={restart_timestep}");
        }
        template.insert("linear_solver", &solver_stage_pattern("linear"));
        template.insert("nonLinear_solver", &solver_stage_pattern("nonLinear"));
        template.insert("solver", &plan.flags.join(" "));
        template.insert(EXTRA_FLAGS, "{extra_command_line_flags}");
        template
    }

    pub fn insert(&mut self, name: &str, pattern: &str) {
        self.entries.insert(name.to_string(), pattern.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }
}

fn solver_stage_pattern(prefix: &str) -> String {
    let field = format!("{}_solver", prefix);
    format!(
        "--{prefix}Tolerance={{{field}[tolerance]}} \
         --{prefix}MinIterations={{{field}[min_iterations]}} \
         --{prefix}MaxIterations={{{field}[max_iterations]}}"
    )
}

/// Descriptors handed to the binary: the staged main descriptor, the staged
/// equilibration descriptor for the thermal phase, then whatever the solver
/// plan requires.
pub fn input_descriptors(params: &ModelParameters, plan: &SolverPlan) -> Vec<PathBuf> {
    let mut descriptors = vec![params.xmls_dir.join(MAIN_DESCRIPTOR)];
    if params.phase() == Phase::Equilibration {
        descriptors.push(params.xmls_dir.join(THERMAL_DESCRIPTOR));
    }
    descriptors.extend(plan.extra_descriptors.iter().cloned());
    descriptors
}

/// Named values the templates may reference.
pub fn template_fields(params: &ModelParameters, descriptors: &[PathBuf]) -> TemplateFields {
    let active = params.active();
    let mut fields = TemplateFields::new();

    fields.insert(
        "parallel_command".to_string(),
        TemplateValue::List(
            params
                .launcher
                .command
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        ),
    );
    fields.insert(
        "parallel_command_cpu_flag".to_string(),
        TemplateValue::scalar(&params.launcher.cpu_flag),
    );
    if let Some(cpus) = &params.launcher.cpus {
        fields.insert("cpus".to_string(), TemplateValue::scalar(cpus));
    }
    fields.insert(
        "uwbinary".to_string(),
        TemplateValue::scalar(params.binary_path.display()),
    );
    fields.insert(
        "input_xmls".to_string(),
        TemplateValue::List(
            descriptors
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        ),
    );
    fields.insert(
        "resolution".to_string(),
        TemplateValue::Keyed(
            Axis::ALL
                .iter()
                .map(|axis| {
                    (
                        axis.as_str().to_string(),
                        active.resolution.get(*axis).to_string(),
                    )
                })
                .collect(),
        ),
    );
    fields.insert(
        "dims".to_string(),
        TemplateValue::scalar(params.dimensionality.as_u8()),
    );
    fields.insert(
        "output_path".to_string(),
        TemplateValue::scalar(params.output_path().display()),
    );
    fields.insert(
        "max_time".to_string(),
        TemplateValue::scalar(active.max_time),
    );
    fields.insert(
        "max_timesteps".to_string(),
        TemplateValue::scalar(active.max_timesteps),
    );
    fields.insert(
        "checkpoint_every_x_years".to_string(),
        TemplateValue::scalar(active.checkpoint_every_x_years),
    );
    fields.insert(
        "checkpoint_every_x_steps".to_string(),
        TemplateValue::scalar(active.checkpoint_every_x_steps),
    );
    if let Some(timestep) = params.restart_timestep {
        fields.insert(
            "restart_timestep".to_string(),
            TemplateValue::scalar(timestep),
        );
    }
    fields.insert(
        "linear_solver".to_string(),
        solver_stage_value(&params.linear_solver),
    );
    fields.insert(
        "nonLinear_solver".to_string(),
        solver_stage_value(&params.nonlinear_solver),
    );
    fields.insert(
        "extra_command_line_flags".to_string(),
        TemplateValue::scalar(&params.extra_flags),
    );
    fields
}

fn solver_stage_value(stage: &SolverStage) -> TemplateValue {
    TemplateValue::Keyed(BTreeMap::from([
        ("tolerance".to_string(), stage.tolerance.to_string()),
        (
            "min_iterations".to_string(),
            stage.min_iterations.to_string(),
        ),
        (
            "max_iterations".to_string(),
            stage.max_iterations.to_string(),
        ),
    ]))
}

/// Discrete argv. The first `prefix_len` entries are the launcher, the binary
/// and the input descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledCommand {
    argv: Vec<String>,
    prefix_len: usize,
}

impl AssembledCommand {
    /// `prefix_len` counts the leading launcher, binary and descriptor entries.
    pub fn new(argv: Vec<String>, prefix_len: usize) -> Self {
        Self { argv, prefix_len }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn prefix(&self) -> &[String] {
        &self.argv[..self.prefix_len.min(self.argv.len())]
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(self.program());
        command.args(self.args());
        command
    }
}

impl Display for AssembledCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Builds the argv for a fully resolved job.
pub fn assemble_for_job(
    params: &ModelParameters,
    plan: &SolverPlan,
) -> LmrResult<AssembledCommand> {
    let descriptors = input_descriptors(params, plan);
    let fields = template_fields(params, &descriptors);
    assemble(CommandTemplate::for_job(params, plan), &fields)
}

pub fn assemble(
    mut template: CommandTemplate,
    fields: &TemplateFields,
) -> LmrResult<AssembledCommand> {
    let mut argv = Vec::new();
    for name in [PARALLEL_RUNNER, BINARY, INPUT_XMLS] {
        if let Some(pattern) = template.remove(name) {
            expand_pattern(&pattern, fields, &mut argv)?;
        }
    }
    let prefix_len = argv.len();

    let extra = template.remove(EXTRA_FLAGS);
    for pattern in template.entries.values() {
        expand_pattern(pattern, fields, &mut argv)?;
    }

    if let Some(pattern) = extra {
        let flags = substitute_token(pattern.trim(), fields)?;
        if !flags.trim().is_empty() {
            argv.push(flags);
        }
    }

    if argv.is_empty() {
        return Err(LmrError::internal(
            "SYS.EMPTY_COMMAND",
            "command template produced no arguments",
        ));
    }

    Ok(AssembledCommand { argv, prefix_len })
}

fn expand_pattern(
    pattern: &str,
    fields: &TemplateFields,
    argv: &mut Vec<String>,
) -> LmrResult<()> {
    for token in pattern.split_whitespace() {
        if let Some(items) = whole_token_list(token, fields)? {
            argv.extend(items.iter().cloned());
        } else {
            argv.push(substitute_token(token, fields)?);
        }
    }
    Ok(())
}

fn whole_token_list<'a>(
    token: &str,
    fields: &'a TemplateFields,
) -> LmrResult<Option<&'a [String]>> {
    let Some(name) = token
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return Ok(None);
    };
    if name.contains(['{', '}', '[']) {
        return Ok(None);
    }
    match lookup(fields, name)? {
        TemplateValue::List(items) => Ok(Some(items)),
        _ => Ok(None),
    }
}

fn substitute_token(token: &str, fields: &TemplateFields) -> LmrResult<String> {
    let mut rendered = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            LmrError::internal(
                "SYS.TEMPLATE_SYNTAX",
                format!("unterminated placeholder in '{}'", token),
            )
        })?;
        rendered.push_str(&resolve_placeholder(&after[..close], fields)?);
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

fn resolve_placeholder(placeholder: &str, fields: &TemplateFields) -> LmrResult<String> {
    let (name, key) = match placeholder.split_once('[') {
        Some((name, key)) => {
            let key = key.strip_suffix(']').ok_or_else(|| {
                LmrError::internal(
                    "SYS.TEMPLATE_SYNTAX",
                    format!("malformed placeholder '{{{}}}'", placeholder),
                )
            })?;
            (name, Some(key))
        }
        None => (placeholder, None),
    };

    match (lookup(fields, name)?, key) {
        (TemplateValue::Scalar(value), None) => Ok(value.clone()),
        (TemplateValue::List(items), None) => Ok(items.join(" ")),
        (TemplateValue::Keyed(values), Some(key)) => values.get(key).cloned().ok_or_else(|| {
            LmrError::internal(
                "SYS.TEMPLATE_FIELD",
                format!("template field '{}' has no entry '{}'", name, key),
            )
        }),
        _ => Err(LmrError::internal(
            "SYS.TEMPLATE_FIELD",
            format!("template placeholder '{{{}}}' does not match its field", placeholder),
        )),
    }
}

fn lookup<'a>(fields: &'a TemplateFields, name: &str) -> LmrResult<&'a TemplateValue> {
    fields.get(name).ok_or_else(|| {
        LmrError::internal(
            "SYS.TEMPLATE_FIELD",
            format!("template references unknown field '{}'", name),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{
        CommandTemplate, DISABLE_WINDOW_FLAG, TemplateFields, TemplateValue, assemble,
        assemble_for_job,
    };
    use crate::domain::LmrErrorCategory;
    use crate::model::ModelParameters;
    use crate::solver::{SolverInputs, select_solver};
    use crate::test_support::{parameters_for, sample_job, set, stage_binary};
    use std::path::Path;
    use tempfile::TempDir;

    fn job_parameters(
        temp: &TempDir,
        edit: impl FnOnce(&mut serde_json::Value),
    ) -> ModelParameters {
        let binary = stage_binary(temp.path());
        let mut job = sample_job(&binary);
        edit(&mut job);
        let mut params = parameters_for(job, &temp.path().join("job"));
        params.xmls_dir = params.output_path().join("xmls");
        params
    }

    fn command_for(params: &ModelParameters) -> Vec<String> {
        let plan = select_solver(&SolverInputs::from_parameters(params), &params.simulation_root)
            .expect("solver plan should build");
        assemble_for_job(params, &plan)
            .expect("command should assemble")
            .argv()
            .to_vec()
    }

    #[test]
    fn launcher_binary_and_descriptors_come_first() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |_| {});
        let argv = command_for(&params);

        assert_eq!(argv[0], "mpirun");
        assert_eq!(argv[1], "-np");
        assert_eq!(argv[2], "4");
        assert_eq!(argv[3], params.binary_path.display().to_string());
        assert_eq!(
            argv[4],
            params.xmls_dir.join("lmrMain.xml").display().to_string()
        );
        assert!(argv.iter().any(|arg| arg == "--dim=2"));
        assert!(argv.iter().any(|arg| arg == "--elementResK=0"));
        assert!(argv.iter().any(|arg| arg == "--maxTimeSteps=100"));
        assert!(argv.iter().any(|arg| arg == DISABLE_WINDOW_FLAG));
        assert!(argv.iter().any(|arg| arg == "--nonLinearMaxIterations=50"));
        assert!(!argv.iter().any(|arg| arg.starts_with("--restartTimestep")));
    }

    #[test]
    fn small_planar_job_runs_direct_solver() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |_| {});
        let argv = command_for(&params);

        assert!(argv.iter().any(|arg| arg == "-Uzawa_velSolver_pc_type"));
        assert!(!argv.iter().any(|arg| arg.starts_with("--mgLevels")));
    }

    #[test]
    fn large_planar_job_runs_multigrid_with_extra_descriptor() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |job| {
            set(job, &["Output_Controls", "model_resolution", "x"], "2000");
            set(job, &["Output_Controls", "model_resolution", "y"], "2000");
        });
        let argv = command_for(&params);

        assert!(argv.iter().any(|arg| arg == "--mgLevels=4"));
        assert!(argv.iter().any(|arg| arg == "--dim=2"));
        assert_eq!(
            argv[5],
            params
                .simulation_root
                .join("StgFEM/Apps/src/MultigridForRegular.xml")
                .display()
                .to_string()
        );
    }

    #[test]
    fn thermal_phase_appends_equilibration_descriptor_and_thermal_controls() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |job| {
            set(
                job,
                &["Thermal_Equilibration", "run_thermal_equilibration_phase"],
                "true",
            );
        });
        let argv = command_for(&params);

        assert_eq!(
            argv[5],
            params
                .xmls_dir
                .join("lmrThermalEquilibration.xml")
                .display()
                .to_string()
        );
        assert!(argv.iter().any(|arg| arg == "--elementResI=25"));
        assert!(argv.iter().any(|arg| arg == "--maxTimeSteps=20"));
        assert!(argv.iter().any(|arg| arg == "--nonLinearMaxIterations=1"));
    }

    #[test]
    fn restart_and_extra_flags_are_appended() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut params = job_parameters(&temp, |job| {
            set(
                job,
                &["Underworld_Execution", "extra_command_line_flags"],
                "--foo=1 --bar=2",
            );
            set(job, &["Output_Controls", "output_pictures"], "true");
        });
        params.restart_timestep = Some(40);
        let argv = command_for(&params);

        assert!(argv.iter().any(|arg| arg == "--restartTimestep=40"));
        assert!(!argv.iter().any(|arg| arg == DISABLE_WINDOW_FLAG));
        assert_eq!(argv.last().map(String::as_str), Some("--foo=1 --bar=2"));
    }

    #[test]
    fn supercomputer_launcher_has_no_cpu_count_and_splits_on_whitespace() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |job| {
            set(
                job,
                &["Underworld_Execution", "supercomputer_mpi_format"],
                "true",
            );
            set(
                job,
                &["Underworld_Execution", "parallel_command"],
                "aprun -B",
            );
        });
        let argv = command_for(&params);

        assert_eq!(argv[0], "aprun");
        assert_eq!(argv[1], "-B");
        assert_eq!(argv[2], params.binary_path.display().to_string());
    }

    #[test]
    fn paths_with_spaces_stay_single_arguments() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut params = job_parameters(&temp, |_| {});
        params.model_output_path = Path::new("/data/my runs/result").to_path_buf();
        let argv = command_for(&params);

        assert!(
            argv.iter()
                .any(|arg| arg == "--outputPath=/data/my runs/result")
        );
    }

    #[test]
    fn remaining_entries_follow_name_order() {
        let mut template = CommandTemplate::default();
        template.insert("uwbinary", "{bin}");
        template.insert("zeta", "--z");
        template.insert("alpha", "--a={value}");
        let fields = TemplateFields::from([
            ("bin".to_string(), TemplateValue::Scalar("uw".to_string())),
            ("value".to_string(), TemplateValue::Scalar("1".to_string())),
        ]);

        let command = assemble(template, &fields).expect("assembly should succeed");
        assert_eq!(command.argv(), ["uw", "--a=1", "--z"]);
        assert_eq!(command.prefix(), ["uw"]);
        assert_eq!(command.to_string(), "uw --a=1 --z");
    }

    #[test]
    fn unknown_field_is_internal_error() {
        let mut template = CommandTemplate::default();
        template.insert("uwbinary", "{missing}");
        let error = assemble(template, &TemplateFields::new())
            .expect_err("unknown field should fail");
        assert_eq!(error.category(), LmrErrorCategory::Internal);
        assert_eq!(error.code(), "SYS.TEMPLATE_FIELD");
    }

    #[test]
    fn empty_extra_flags_are_omitted() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |_| {});
        let argv = command_for(&params);
        assert!(argv.iter().all(|arg| !arg.is_empty()));
        assert_eq!(argv.last().map(String::as_str), Some("-options_left"));
    }

    #[test]
    fn blank_launcher_runs_the_binary_directly() {
        let temp = TempDir::new().expect("tempdir should be created");
        let params = job_parameters(&temp, |job| {
            set(job, &["Underworld_Execution", "parallel_command"], "  ");
        });
        let argv = command_for(&params);
        assert_eq!(argv[0], params.binary_path.display().to_string());
    }
}

mod commands;
mod helpers;

use clap::Parser;
use lmr_core::domain::LmrError;

/// Exit code for a production run the user cancelled.
pub const CANCELLED_EXIT_CODE: i32 = 130;

pub fn run_from_env() -> i32 {
    let args = std::env::args().collect::<Vec<_>>();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let lmr_error = error.as_lmr_error();
            eprintln!("{}", lmr_error.diagnostic_line());
            eprintln!("{}", lmr_error.fatal_exit_line());
            lmr_error.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "lmr-run",
    version,
    about = "Prepare, launch and supervise Underworld lithospheric model runs"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Stage the job and run the simulation to completion
    Run(commands::JobArgs),
    /// Resolve the job and print the command without launching it
    Plan(commands::PlanArgs),
    /// Print the latest checkpointed timestep in an output directory
    LastTimestep(commands::LastTimestepArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    helpers::init_logging();
    match command {
        CliCommand::Run(args) => commands::run_job_command(args),
        CliCommand::Plan(args) => commands::run_plan_command(args),
        CliCommand::LastTimestep(args) => commands::run_last_timestep_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Job(#[from] LmrError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_lmr_error(&self) -> LmrError {
        match self {
            Self::Usage(message) => {
                LmrError::configuration("CONFIG.CLI_USAGE", message.trim_end().to_string())
            }
            Self::Job(error) => error.clone(),
            Self::Internal(error) => LmrError::internal("SYS.CLI", format!("{error:#}")),
        }
    }
}

use super::CliError;
use anyhow::Context;
use lmr_core::pipeline::DEFAULT_JOB_FILE;
use lmr_core::supervisor::CancellationFlag;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_FILTER: &str = "lmr_run=info,lmr_core=info";

/// Diagnostics go to stderr; `RUST_LOG` overrides the default filter.
pub(super) fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // Already initialised when embedded in another subscriber's process.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The first interrupt only raises the flag; the supervisor decides how to
/// stop the child.
pub(super) fn install_interrupt_handler() -> Result<CancellationFlag, CliError> {
    let cancel = CancellationFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        handler_flag.cancel();
    })
    .context("failed to install the interrupt handler")?;
    Ok(cancel)
}

pub(super) fn job_file_or_default(job: Option<PathBuf>) -> PathBuf {
    job.unwrap_or_else(|| PathBuf::from(DEFAULT_JOB_FILE))
}

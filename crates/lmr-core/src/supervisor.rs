//! Launches the assembled command and watches it to completion.

use crate::command::AssembledCommand;
use crate::domain::{LmrError, LmrResult, Phase};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a cancelled child may take to exit after the termination request
/// before it is killed.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(10);

const DECOMPOSITION_HINT: &str = "\
if the failure looks like `ISet.c: failed assertion (++self->curSize) <= self->maxSize`, the \
model could not be decomposed across the requested CPUs; try resolutions that divide nicely \
(not prime numbers), a higher resolution, or fewer CPUs";

/// Where the child's merged output and the run notices go.
#[derive(Debug)]
pub enum OutputSink {
    Terminal,
    LogFile { path: PathBuf, file: File },
}

impl OutputSink {
    pub fn terminal() -> Self {
        Self::Terminal
    }

    /// Opens `path` for appending, creating it when missing. The file stays
    /// open for as long as the sink lives.
    pub fn log_file(path: impl AsRef<Path>) -> LmrResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| {
                LmrError::internal(
                    "SYS.LOG_FILE",
                    format!("failed to open log file '{}': {}", path.display(), source),
                )
            })?;
        Ok(Self::LogFile {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Terminal => None,
            Self::LogFile { path, .. } => Some(path),
        }
    }

    /// Writes one line to the sink.
    pub fn notice(&mut self, message: &str) -> LmrResult<()> {
        writeln!(self, "{}", message)
            .and_then(|()| self.flush())
            .map_err(|source| {
                LmrError::internal(
                    "SYS.OUTPUT_SINK",
                    format!("failed to write run notice: {}", source),
                )
            })
    }

    /// Stdout and stderr handles for the child; both point at the same
    /// destination so the streams interleave as the child writes them.
    fn child_stdio(&self) -> io::Result<(Stdio, Stdio)> {
        match self {
            Self::Terminal => Ok((Stdio::inherit(), terminal_stderr()?)),
            Self::LogFile { file, .. } => {
                Ok((Stdio::from(file.try_clone()?), Stdio::from(file.try_clone()?)))
            }
        }
    }
}

#[cfg(unix)]
fn terminal_stderr() -> io::Result<Stdio> {
    use std::os::fd::AsFd;
    let stdout = io::stdout();
    let fd = stdout.as_fd().try_clone_to_owned()?;
    Ok(Stdio::from(fd))
}

#[cfg(not(unix))]
fn terminal_stderr() -> io::Result<Stdio> {
    Ok(Stdio::inherit())
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Terminal => io::stdout().lock().write(buf),
            Self::LogFile { file, .. } => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Terminal => io::stdout().lock().flush(),
            Self::LogFile { file, .. } => file.flush(),
        }
    }
}

/// Set from the interrupt handler, polled by the supervisor.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    FailedNonZeroExit,
    FailedToLaunch,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The child was stopped after a cancellation request.
    Interrupted,
}

pub struct RunSupervisor {
    cancel: CancellationFlag,
    poll_interval: Duration,
    termination_grace: Duration,
    state: RunState,
}

impl RunSupervisor {
    pub fn new(cancel: CancellationFlag) -> Self {
        Self {
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            termination_grace: DEFAULT_TERMINATION_GRACE,
            state: RunState::NotStarted,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_termination_grace(mut self, termination_grace: Duration) -> Self {
        self.termination_grace = termination_grace;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs `command` to completion with its output in `sink`.
    ///
    /// A cancelled equilibration run is a soft stop: a warning goes to the
    /// sink and the outcome is `Interrupted` so cleanup can still run. A
    /// cancelled production run is also `Interrupted`; the caller ends the job.
    pub fn run(
        &mut self,
        command: &AssembledCommand,
        phase: Phase,
        sink: &mut OutputSink,
    ) -> LmrResult<RunOutcome> {
        let (stdout, stderr) = sink.child_stdio().map_err(|source| {
            LmrError::internal(
                "SYS.OUTPUT_SINK",
                format!("failed to attach run output: {}", source),
            )
        })?;

        let mut process = command.to_command();
        process.stdin(Stdio::null()).stdout(stdout).stderr(stderr);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state = RunState::FailedToLaunch;
                return Err(LmrError::launch(
                    "LAUNCH.SPAWN",
                    format!(
                        "failed to start `{} ...`: {}; make sure the launcher (e.g. '{}') is \
                         installed and every file in the command exists",
                        command.prefix().join(" "),
                        source,
                        command.program()
                    ),
                ));
            }
        };

        self.state = RunState::Running;
        info!(program = command.program(), phase = %phase, "simulation started");

        match self.wait(&mut child)? {
            Some(status) => self.finish(status, phase),
            None => {
                self.state = RunState::Interrupted;
                match phase {
                    Phase::Equilibration => {
                        warn!("thermal equilibration interrupted");
                        sink.notice(
                            "=== WARNING ===\nthermal equilibration stopped; the last \
                             checkpoint written will be used as the initial condition",
                        )?;
                    }
                    Phase::Production => {
                        warn!("production run cancelled");
                    }
                }
                Ok(RunOutcome::Interrupted)
            }
        }
    }

    /// `None` when the run was cancelled.
    fn wait(&self, child: &mut Child) -> LmrResult<Option<ExitStatus>> {
        loop {
            if self.cancel.is_cancelled() {
                self.stop_child(child);
                return Ok(None);
            }

            match child.try_wait() {
                // The child usually sees the same interrupt and exits first.
                Ok(Some(_)) if self.cancel.is_cancelled() => return Ok(None),
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => {}
                Err(source) => {
                    force_kill(child);
                    return Err(LmrError::internal(
                        "SYS.CHILD_WAIT",
                        format!("failed to wait for the simulation: {}", source),
                    ));
                }
            }

            thread::sleep(self.poll_interval);
        }
    }

    fn finish(&mut self, status: ExitStatus, phase: Phase) -> LmrResult<RunOutcome> {
        if status.success() {
            self.state = RunState::Succeeded;
            info!("simulation finished");
            return Ok(RunOutcome::Completed);
        }

        self.state = RunState::FailedNonZeroExit;
        let exit = status
            .code()
            .map(|code| format!("exit status {}", code))
            .unwrap_or_else(|| "a signal".to_string());
        let mut message = format!(
            "the simulation ended with {}; check its output to find the problem",
            exit
        );
        if phase == Phase::Equilibration {
            message.push_str("; ");
            message.push_str(DECOMPOSITION_HINT);
        }
        Err(LmrError::run("RUN.NONZERO_EXIT", message))
    }

    /// Asks the child to terminate, waits out the grace period, then kills it.
    fn stop_child(&self, child: &mut Child) {
        request_termination(child);
        let deadline = Instant::now() + self.termination_grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "simulation stopped after termination request");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(self.poll_interval),
                Ok(None) => {
                    warn!(
                        grace_secs = self.termination_grace.as_secs_f64(),
                        "simulation ignored the termination request; killing it"
                    );
                    break;
                }
                Err(source) => {
                    debug!(error = %source, "polling stopped child failed");
                    break;
                }
            }
        }
        force_kill(child);
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        force_kill(child);
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(error = %errno, "termination request failed");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    force_kill(child);
}

fn force_kill(child: &mut Child) {
    if let Err(source) = child.kill() {
        debug!(error = %source, "kill request failed");
    }
    if let Err(source) = child.wait() {
        debug!(error = %source, "reaping stopped child failed");
    }
}

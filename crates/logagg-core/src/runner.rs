//! External command execution.
//!
//! Transform, load and dashboard stages shell out (filebeat and kibana-tools
//! run as docker containers). [`CommandRunner`] is the seam; tests and
//! `--dry-run` use [`DryRunCommandRunner`].

use crate::error::StageError;
use logagg_common::CancelFlag;
use parking_lot::Mutex;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default time budget for one command.
pub const DEFAULT_COMMAND_BUDGET: Duration = Duration::from_secs(60 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A shell command line plus how to present it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    /// Text used in logs, audit records and errors (secrets removed).
    pub label: String,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            label: command.clone(),
            command,
            working_dir: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Captured result of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Trait for running external commands.
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion. A non-zero exit is `CommandFailed`.
    fn run(&self, spec: &CommandSpec, cancel: &CancelFlag) -> Result<CommandOutput, StageError>;
}

/// Runs commands through `sh -c` with a time budget.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: PathBuf,
    budget: Duration,
}

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("sh"),
            budget: DEFAULT_COMMAND_BUDGET,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    fn spawn(&self, spec: &CommandSpec) -> std::io::Result<Child> {
        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(&spec.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        command.spawn()
    }

    /// Join the pipe readers once the shell has exited.
    ///
    /// A background process started by the command inherits the pipes and
    /// keeps them open, so this wait is bounded by the same budget and cancel
    /// flag as the child. On either, the readers are abandoned.
    fn wait_for_output(
        &self,
        spec: &CommandSpec,
        stdout: Option<JoinHandle<String>>,
        stderr: Option<JoinHandle<String>>,
        started: Instant,
        cancel: &CancelFlag,
    ) -> Result<(String, String), StageError> {
        while !(finished(&stdout) && finished(&stderr)) {
            if cancel.is_cancelled() {
                warn!(command = %spec.label, "cancelled while output pipes were still open");
                return Err(StageError::Cancelled);
            }
            if started.elapsed() > self.budget {
                warn!(command = %spec.label, "output pipes held open past the budget");
                return Err(StageError::Timeout {
                    command: spec.label.clone(),
                    budget_ms: self.budget.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok((collect(stdout), collect(stderr)))
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelFlag) -> Result<CommandOutput, StageError> {
        let started = Instant::now();
        info!(command = %spec.label, "running command");

        let mut child = self.spawn(spec).map_err(|e| StageError::CommandFailed {
            command: spec.label.clone(),
            status: None,
            stderr: e.to_string(),
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let (stdout, stderr) =
                        self.wait_for_output(spec, stdout, stderr, started, cancel)?;
                    let duration_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        command = %spec.label,
                        code = ?status.code(),
                        duration_ms,
                        "command exited"
                    );
                    if !status.success() {
                        return Err(StageError::CommandFailed {
                            command: spec.label.clone(),
                            status: status.code(),
                            stderr: stderr.trim_end().to_string(),
                        });
                    }
                    return Ok(CommandOutput {
                        stdout,
                        stderr,
                        duration_ms,
                    });
                }
                Ok(None) => {
                    if cancel.is_cancelled() {
                        stop(&mut child, &spec.label);
                        return Err(StageError::Cancelled);
                    }
                    if started.elapsed() > self.budget {
                        stop(&mut child, &spec.label);
                        return Err(StageError::Timeout {
                            command: spec.label.clone(),
                            budget_ms: self.budget.as_millis() as u64,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    stop(&mut child, &spec.label);
                    return Err(StageError::CommandFailed {
                        command: spec.label.clone(),
                        status: None,
                        stderr: e.to_string(),
                    });
                }
            }
        }
    }
}

fn finished(handle: &Option<JoinHandle<String>>) -> bool {
    handle.as_ref().is_none_or(JoinHandle::is_finished)
}

/// Read a child pipe to the end on a helper thread so the child never
/// blocks on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!(error = %e, "failed to read child output");
            }
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Kill and reap. Pipe reader threads are left to finish on their own.
fn stop(child: &mut Child, label: &str) {
    if let Err(e) = child.kill() {
        warn!(command = %label, error = %e, "failed to kill command");
    }
    if let Err(e) = child.wait() {
        warn!(command = %label, error = %e, "failed to reap command");
    }
}

/// Records commands instead of running them.
#[derive(Debug, Default)]
pub struct DryRunCommandRunner {
    executed: Mutex<Vec<CommandSpec>>,
}

impl DryRunCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.executed.lock().clone()
    }
}

impl CommandRunner for DryRunCommandRunner {
    fn run(&self, spec: &CommandSpec, cancel: &CancelFlag) -> Result<CommandOutput, StageError> {
        if cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        info!(command = %spec.label, "dry run: command not executed");
        self.executed.lock().push(spec.clone());
        Ok(CommandOutput::default())
    }
}

/// Quote `arg` for `sh` unless it only holds characters with no shell meaning.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.,:/=@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

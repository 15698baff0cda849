//! Builds images and runs throwaway containers through a container CLI.
//!
//! Every container created by [`ContainerSandbox::run`] is owned by a
//! [`ContainerGuard`] and removed when the guard drops, whichever way the run
//! ends.

use chrono::{DateTime, Utc};
use config_loader::ContainerSettings;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

pub mod command;

pub use command::split_command;

/// Build an image from a directory and run commands against it.
pub trait ValidationSandbox {
    fn build(&mut self, context_dir: &Path, tag: &str) -> Result<(), BuildError>;

    /// Run `command` as the arguments of a fresh container of `tag`.
    fn run(&mut self, tag: &str, command: &str) -> Result<RunOutcome, SandboxError>;
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to spawn container runtime {runtime}: {source}")]
    Spawn {
        runtime: String,
        source: std::io::Error,
    },
    /// `output` is the runtime's complete diagnostic text.
    #[error("image build failed:\n{output}")]
    Failed { output: String },
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to spawn container runtime {runtime}: {source}")]
    Spawn {
        runtime: String,
        source: std::io::Error,
    },
    #[error("container {step} failed: {output}")]
    Runtime { step: &'static str, output: String },
    #[error("container did not finish within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("invalid test command: {message}")]
    InvalidCommand { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub tag: String,
    pub command: String,
    pub exit_code: i32,
    pub logs: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Every run made during one pipeline invocation, oldest first.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    runs: Vec<RunOutcome>,
}

impl RunHistory {
    pub fn push(&mut self, outcome: RunOutcome) {
        self.runs.push(outcome);
    }

    pub fn last(&self) -> Option<&RunOutcome> {
        self.runs.last()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunOutcome> {
        self.runs.iter()
    }
}

#[derive(Debug, Clone)]
struct CommandLogs {
    stdout: String,
    stderr: String,
}

impl CommandLogs {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut text = self.stdout.clone();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&self.stderr);
                text
            }
        }
    }
}

/// Removes its container on drop. Removal failures are logged and
/// swallowed so they never replace the outcome of the run itself.
pub struct ContainerGuard {
    runtime: String,
    id: String,
}

impl ContainerGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let result = Command::new(&self.runtime)
            .args(["rm", "-f", &self.id])
            .stdin(Stdio::null())
            .output();
        match result {
            Ok(output) if output.status.success() => {
                debug!(container = %self.id, "container removed");
            }
            Ok(output) => warn!(
                container = %self.id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "failed to remove container"
            ),
            Err(err) => warn!(container = %self.id, error = %err, "failed to remove container"),
        }
    }
}

pub struct ContainerSandbox {
    runtime: String,
    run_timeout: Duration,
    cpus: Option<String>,
    memory: Option<String>,
    pids_limit: Option<String>,
}

impl ContainerSandbox {
    pub fn new(settings: &ContainerSettings) -> Self {
        Self {
            runtime: settings.runtime.clone(),
            run_timeout: settings.run_timeout,
            cpus: settings.cpus.clone(),
            memory: settings.memory.clone(),
            pids_limit: settings.pids_limit.clone(),
        }
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.runtime);
        command.stdin(Stdio::null());
        command
    }

    fn create_args(&self, tag: &str, args: &[String]) -> Vec<String> {
        let mut out = vec!["create".to_string()];
        let limits = [
            ("--cpus", &self.cpus),
            ("--memory", &self.memory),
            ("--pids-limit", &self.pids_limit),
        ];
        for (flag, value) in limits {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                out.push(flag.to_string());
                out.push(value.to_string());
            }
        }
        out.push(tag.to_string());
        out.extend(args.iter().cloned());
        out
    }

    fn invoke(&self, step: &'static str, args: &[String]) -> Result<CommandLogs, SandboxError> {
        let mut command = self.command();
        command.args(args);
        debug!(cmdline = %command_line_string(&command), "container.{}", step);

        let output = command.output().map_err(|source| SandboxError::Spawn {
            runtime: self.runtime.clone(),
            source,
        })?;
        let logs = CommandLogs::from_output(&output);
        if output.status.success() {
            Ok(logs)
        } else {
            Err(SandboxError::Runtime {
                step,
                output: logs.combined(),
            })
        }
    }

    fn create(&self, tag: &str, args: &[String]) -> Result<ContainerGuard, SandboxError> {
        let logs = self.invoke("create", &self.create_args(tag, args))?;
        let id = logs.stdout.trim().to_string();
        if id.is_empty() {
            return Err(SandboxError::Runtime {
                step: "create",
                output: "runtime printed no container id".to_string(),
            });
        }
        Ok(ContainerGuard {
            runtime: self.runtime.clone(),
            id,
        })
    }

    fn wait(&self, guard: &ContainerGuard) -> Result<i32, SandboxError> {
        let mut child = self
            .command()
            .args(["wait", guard.id()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                runtime: self.runtime.clone(),
                source,
            })?;

        let status = match child.wait_timeout(self.run_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SandboxError::Timeout {
                    timeout: self.run_timeout,
                });
            }
            Err(err) => {
                let _ = child.kill();
                return Err(SandboxError::Runtime {
                    step: "wait",
                    output: err.to_string(),
                });
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stdout.take() {
            let _ = pipe.read_to_string(&mut stdout);
        }
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        if !status.success() {
            return Err(SandboxError::Runtime {
                step: "wait",
                output: CommandLogs { stdout, stderr }.combined(),
            });
        }

        let text = stdout.trim();
        text.lines()
            .last()
            .and_then(|line| line.trim().parse::<i32>().ok())
            .ok_or_else(|| SandboxError::Runtime {
                step: "wait",
                output: format!("unexpected exit status output '{}'", text),
            })
    }
}

impl ValidationSandbox for ContainerSandbox {
    fn build(&mut self, context_dir: &Path, tag: &str) -> Result<(), BuildError> {
        let mut command = self.command();
        command.arg("build").arg("--rm").arg("-t").arg(tag).arg(context_dir);
        info!(%tag, context = %context_dir.display(), "sandbox.build");
        debug!(cmdline = %command_line_string(&command), "container.build");

        let output = command.output().map_err(|source| BuildError::Spawn {
            runtime: self.runtime.clone(),
            source,
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BuildError::Failed {
                output: CommandLogs::from_output(&output).combined(),
            })
        }
    }

    fn run(&mut self, tag: &str, command: &str) -> Result<RunOutcome, SandboxError> {
        let args = split_command(command)?;
        info!(%tag, %command, "sandbox.run");

        let started_at = Utc::now();
        let start = Instant::now();

        let guard = self.create(tag, &args)?;
        self.invoke("start", &["start".to_string(), guard.id().to_string()])?;
        let exit_code = self.wait(&guard)?;
        let logs = self
            .invoke("logs", &["logs".to_string(), guard.id().to_string()])?
            .combined();
        drop(guard);

        let duration = start.elapsed();
        info!(%tag, exit_code, duration_ms = duration.as_millis() as u64, "sandbox.run.done");

        Ok(RunOutcome {
            tag: tag.to_string(),
            command: command.to_string(),
            exit_code,
            logs,
            started_at,
            duration_ms: duration.as_secs_f64() * 1000.0,
        })
    }
}

fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let escaped = arg.replace('\'', "'\\''");
    format!("'{}'", escaped)
}

fn command_line_string(cmd: &Command) -> String {
    let mut s = cmd.get_program().to_string_lossy().to_string();
    for a in cmd.get_args() {
        s.push(' ');
        let a = a.to_string_lossy();
        if a.is_empty() || a.contains([' ', '"', '\'']) {
            s.push_str(&shell_escape(&a));
        } else {
            s.push_str(&a);
        }
    }
    s
}

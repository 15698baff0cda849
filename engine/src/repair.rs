//! Bounded generate → build → test loop.
//!
//! The host drives every step. The oracle only ever turns text into text;
//! this loop decides when to build, when to test and when to give up.

use capsules_container_exec::{BuildError, RunHistory, SandboxError, ValidationSandbox};
use oracle::services::{repair_artifact, write_artifact};
use oracle::{GenerationOracle, OracleError, ScriptRequirements};
use std::fmt;
use tracing::{error, info, warn};

use crate::build_context::{stage_artifact, BuildContext};
use crate::error::PipelineError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Generate,
    Build,
    Test,
    Success,
    Exhausted,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopState::Generate => "generate",
            LoopState::Build => "build",
            LoopState::Test => "test",
            LoopState::Success => "success",
            LoopState::Exhausted => "exhausted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// The artifact that built and passed its test.
    pub artifact: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RepairLoop {
    max_attempts: u32,
}

impl Default for RepairLoop {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

fn enter(state: LoopState, attempt: u32) {
    info!(%state, attempt, "repair.state");
}

impl RepairLoop {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run until an artifact builds and its test passes, or the attempt
    /// budget is spent.
    ///
    /// Build and test failures never escape: their text becomes the next
    /// repair prompt. Content errors from the oracle (unusable replies) are
    /// treated the same way. Transport and credential errors end the loop.
    pub fn run<O, S>(
        &self,
        oracle: &mut O,
        sandbox: &mut S,
        history: &mut RunHistory,
        requirements: &ScriptRequirements,
        command: &str,
        ctx: &BuildContext,
    ) -> Result<LoopOutcome, PipelineError>
    where
        O: GenerationOracle + ?Sized,
        S: ValidationSandbox + ?Sized,
    {
        let script_filename = ctx
            .script_destination()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| ctx.script_name().to_string());
        let tag = ctx.image_tag();
        let context_dir = ctx.context_directory();

        let mut prior_error: Option<String> = None;
        // Repairs are only sent once the session holds an answered artifact request.
        let mut session_open = false;

        for attempt in 1..=self.max_attempts {
            enter(LoopState::Generate, attempt);
            let error = prior_error.take();
            let generated = if session_open {
                repair_artifact(
                    oracle,
                    error.as_deref().unwrap_or("The previous attempt failed."),
                )
            } else {
                write_artifact(oracle, requirements, &script_filename, command)
            };
            let artifact = match generated {
                Ok(artifact) => {
                    session_open = true;
                    artifact
                }
                Err(err) if err.is_content_error() => {
                    warn!(attempt, error = %err, "unusable oracle reply");
                    // An empty reply is never added to the session
                    if !matches!(err, OracleError::EmptyResponse) {
                        session_open = true;
                    }
                    prior_error = Some(format!(
                        "Your previous reply could not be used ({err}). \
                         Reply with the complete Dockerfile inside one ```dockerfile fenced block."
                    ));
                    continue;
                }
                Err(err) => return Err(PipelineError::Generation(err)),
            };

            stage_artifact(ctx, &artifact)?;

            enter(LoopState::Build, attempt);
            match sandbox.build(&context_dir, &tag) {
                Ok(()) => {}
                Err(err @ BuildError::Spawn { .. }) => {
                    return Err(runtime_unavailable(err));
                }
                Err(BuildError::Failed { output }) => {
                    warn!(attempt, "image build failed");
                    prior_error = Some(build_feedback(&output));
                    continue;
                }
            }

            enter(LoopState::Test, attempt);
            match sandbox.run(&tag, command) {
                Ok(outcome) if outcome.succeeded() => {
                    history.push(outcome);
                    enter(LoopState::Success, attempt);
                    return Ok(LoopOutcome {
                        artifact,
                        attempts: attempt,
                    });
                }
                Ok(outcome) => {
                    warn!(attempt, exit_code = outcome.exit_code, "container test failed");
                    prior_error = Some(test_feedback(command, outcome.exit_code, &outcome.logs));
                    history.push(outcome);
                }
                Err(err @ SandboxError::Spawn { .. }) => {
                    return Err(runtime_unavailable(err));
                }
                Err(err) => {
                    warn!(attempt, error = %err, "container test errored");
                    prior_error = Some(format!(
                        "Running the container with arguments `{command}` failed: {err}"
                    ));
                }
            }
        }

        enter(LoopState::Exhausted, self.max_attempts);
        let last_error = prior_error.unwrap_or_default();
        error!(attempts = self.max_attempts, %last_error, "attempt budget spent");
        Err(PipelineError::AttemptsExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

fn runtime_unavailable<E>(err: E) -> PipelineError
where
    E: std::error::Error + Send + Sync + 'static,
{
    PipelineError::Unexpected(anyhow::Error::new(err).context("container runtime unavailable"))
}

fn build_feedback(output: &str) -> String {
    format!("The Dockerfile failed to build. Build output:\n{output}")
}

fn test_feedback(command: &str, exit_code: i32, logs: &str) -> String {
    format!(
        "The image built, but running it with arguments `{command}` exited with code \
         {exit_code}. Container output:\n{logs}"
    )
}

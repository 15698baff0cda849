#![allow(dead_code)]

use capsules_container_exec::{BuildError, RunOutcome, SandboxError, ValidationSandbox};
use oracle::{GenerationOracle, OracleError};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn fenced(body: &str) -> String {
    format!("```dockerfile\n{body}\n```")
}

pub const REQUIREMENTS_REPLY: &str = r#"```json
{
  "language": "Python",
  "version_requirements": {"python": ">=3.8"},
  "system_dependencies": [],
  "environment_variables": [],
  "execution_pattern": {
    "description": "Counts words in its argument",
    "steps": [{"step": 1, "description": "split and count"}],
    "example": "python word_counter.py \"hello world\""
  }
}
```"#;

#[derive(Debug, Clone)]
pub struct OracleCall {
    pub prompt: String,
    pub system: Option<String>,
}

/// Replies from a queue; once the queue is empty every call fails with
/// `EmptyResponse`.
#[derive(Default)]
pub struct FakeOracle {
    replies: VecDeque<Result<String, OracleError>>,
    pub calls: Vec<OracleCall>,
    pub resets: usize,
}

impl FakeOracle {
    pub fn replying<I, T>(replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(|r| Ok(r.into())).collect(),
            ..Default::default()
        }
    }

    pub fn then_error(mut self, error: OracleError) -> Self {
        self.replies.push_back(Err(error));
        self
    }

    pub fn then_reply(mut self, reply: impl Into<String>) -> Self {
        self.replies.push_back(Ok(reply.into()));
        self
    }
}

impl GenerationOracle for FakeOracle {
    fn generate(&mut self, prompt: &str, system: Option<&str>) -> Result<String, OracleError> {
        self.calls.push(OracleCall {
            prompt: prompt.to_string(),
            system: system.map(str::to_string),
        });
        self.replies
            .pop_front()
            .unwrap_or(Err(OracleError::EmptyResponse))
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

#[derive(Debug, Clone)]
pub struct BuildCall {
    pub dir: PathBuf,
    pub tag: String,
    pub artifact: String,
}

pub enum RunScript {
    Exit(i32),
    Timeout,
}

/// Builds and runs follow their queues; empty queues mean success.
#[derive(Default)]
pub struct FakeSandbox {
    builds_result: VecDeque<Result<(), String>>,
    runs_result: VecDeque<RunScript>,
    pub builds: Vec<BuildCall>,
    pub runs: Vec<(String, String)>,
}

impl FakeSandbox {
    pub fn failing_builds(messages: &[&str]) -> Self {
        Self {
            builds_result: messages.iter().map(|m| Err(m.to_string())).collect(),
            ..Default::default()
        }
    }

    pub fn with_runs(mut self, runs: Vec<RunScript>) -> Self {
        self.runs_result = runs.into();
        self
    }
}

impl ValidationSandbox for FakeSandbox {
    fn build(&mut self, context_dir: &Path, tag: &str) -> Result<(), BuildError> {
        self.builds.push(BuildCall {
            dir: context_dir.to_path_buf(),
            tag: tag.to_string(),
            artifact: fs::read_to_string(context_dir.join("Dockerfile")).unwrap_or_default(),
        });
        match self.builds_result.pop_front() {
            Some(Err(output)) => Err(BuildError::Failed { output }),
            _ => Ok(()),
        }
    }

    fn run(&mut self, tag: &str, command: &str) -> Result<RunOutcome, SandboxError> {
        self.runs.push((tag.to_string(), command.to_string()));
        let exit_code = match self.runs_result.pop_front() {
            Some(RunScript::Timeout) => {
                return Err(SandboxError::Timeout {
                    timeout: Duration::from_secs(1),
                })
            }
            Some(RunScript::Exit(code)) => code,
            None => 0,
        };
        Ok(RunOutcome {
            tag: tag.to_string(),
            command: command.to_string(),
            exit_code,
            logs: format!("fake logs, exit {exit_code}"),
            started_at: chrono::Utc::now(),
            duration_ms: 1.0,
        })
    }
}

use anyhow::Context;
use capsules_container_exec::{RunHistory, ValidationSandbox};
use config_loader::Settings;
use oracle::services::{analyze_example, analyze_script};
use oracle::{GenerationOracle, TokenUsage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span};
use uuid::Uuid;
use wards::SecurityGate;

use crate::build_context::{prepare, stage_artifact, BuildContext};
use crate::error::PipelineError;
use crate::repair::RepairLoop;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub run_id: String,
    pub artifact_path: PathBuf,
    pub image_tag: String,
    pub attempts: u32,
    pub history_len: usize,
    pub usage: TokenUsage,
}

/// Script and example in, working Dockerfile out.
pub struct Pipeline<O, S> {
    gate: SecurityGate<'static>,
    oracle: O,
    sandbox: S,
    context_root: PathBuf,
    repair: RepairLoop,
    history: RunHistory,
}

impl<O, S> Pipeline<O, S>
where
    O: GenerationOracle,
    S: ValidationSandbox,
{
    pub fn new(oracle: O, sandbox: S, context_root: impl Into<PathBuf>, max_attempts: u32) -> Self {
        Self {
            gate: SecurityGate::default(),
            oracle,
            sandbox,
            context_root: context_root.into(),
            repair: RepairLoop::new(max_attempts),
            history: RunHistory::default(),
        }
    }

    pub fn from_settings(settings: &Settings, oracle: O, sandbox: S) -> Self {
        Self::new(
            oracle,
            sandbox,
            settings.context_root.clone(),
            settings.max_attempts,
        )
    }

    pub fn with_gate(mut self, gate: SecurityGate<'static>) -> Self {
        self.gate = gate;
        self
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    pub fn run(
        &mut self,
        script_path: &Path,
        example_path: &Path,
    ) -> Result<PipelineReport, PipelineError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline", %run_id);
        let _entered = span.enter();

        info!(
            script = %script_path.display(),
            example = %example_path.display(),
            "pipeline.start"
        );
        let result = self.run_inner(run_id, script_path, example_path);
        if let Err(err) = &result {
            error!(kind = err.kind(), error = %err, "pipeline.failed");
        }
        result
    }

    fn run_inner(
        &mut self,
        run_id: String,
        script_path: &Path,
        example_path: &Path,
    ) -> Result<PipelineReport, PipelineError> {
        let (script, example) = self.gate.sanitize_paths(script_path, example_path)?;

        info!("pipeline.analyze_script");
        let requirements = analyze_script(&mut self.oracle, &read_text(&script)?)?;

        info!("pipeline.analyze_example");
        let raw_command = analyze_example(&mut self.oracle, &read_text(&example)?)?;
        let command = self
            .gate
            .sanitize_test_command(&raw_command)
            .ok_or_else(|| PipelineError::SecurityRejection {
                reason: format!("unsafe test command '{raw_command}'"),
            })?;

        let ctx = BuildContext::from_script_path(&script, self.context_root.clone())?;
        info!(
            context = %ctx.context_directory().display(),
            tag = %ctx.image_tag(),
            "pipeline.stage"
        );
        prepare(&ctx)?;

        let outcome = self.repair.run(
            &mut self.oracle,
            &mut self.sandbox,
            &mut self.history,
            &requirements,
            &command,
            &ctx,
        )?;
        let artifact_path = stage_artifact(&ctx, &outcome.artifact)?;

        info!(
            attempts = outcome.attempts,
            artifact = %artifact_path.display(),
            "pipeline.success"
        );
        Ok(PipelineReport {
            run_id,
            artifact_path,
            image_tag: ctx.image_tag(),
            attempts: outcome.attempts,
            history_len: self.history.len(),
            usage: self.oracle.usage(),
        })
    }
}

fn read_text(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

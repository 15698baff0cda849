//! The four conversations the pipeline has with an oracle.
//!
//! Analysis and the first artifact each open a fresh session. Repairs stay in
//! the artifact session, so the oracle still sees its previous Dockerfile and
//! only needs the failure text.

use tracing::debug;

use crate::parse::{parse_command, parse_requirements, strip_code_fence};
use crate::{prompts, GenerationOracle, OracleError, ScriptRequirements};

pub fn analyze_script<O>(oracle: &mut O, script: &str) -> Result<ScriptRequirements, OracleError>
where
    O: GenerationOracle + ?Sized,
{
    oracle.reset();
    let reply = oracle.generate(
        &prompts::script_analysis(script),
        Some(prompts::SCRIPT_ANALYSIS_SYSTEM),
    )?;
    let requirements = parse_requirements(&reply)?;
    debug!(language = %requirements.language, "script analyzed");
    Ok(requirements)
}

/// Returns the arguments to pass to the container, still unvetted.
pub fn analyze_example<O>(oracle: &mut O, example: &str) -> Result<String, OracleError>
where
    O: GenerationOracle + ?Sized,
{
    oracle.reset();
    let reply = oracle.generate(
        &prompts::example_analysis(example),
        Some(prompts::EXAMPLE_ANALYSIS_SYSTEM),
    )?;
    parse_command(&reply)
}

pub fn write_artifact<O>(
    oracle: &mut O,
    requirements: &ScriptRequirements,
    script_filename: &str,
    command: &str,
) -> Result<String, OracleError>
where
    O: GenerationOracle + ?Sized,
{
    oracle.reset();
    let reply = oracle.generate(
        &prompts::artifact(&requirements.to_json(), script_filename, command),
        Some(prompts::ARTIFACT_SYSTEM),
    )?;
    strip_code_fence(&reply)
}

pub fn repair_artifact<O>(oracle: &mut O, error: &str) -> Result<String, OracleError>
where
    O: GenerationOracle + ?Sized,
{
    let reply = oracle.generate(&prompts::repair(error), None)?;
    strip_code_fence(&reply)
}

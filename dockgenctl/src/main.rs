use anyhow::{anyhow, Context, Result};
use capsules_container_exec::ContainerSandbox;
use clap::Parser;
use config_loader::{load_dotenv, ConfigError, EnvFileSecretProvider, Settings};
use engine::{Pipeline, PipelineReport};
use oracle::{OracleFactory, Vendor};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const OWN_CRATES: &[&str] = &[
    "dockgenctl",
    "engine",
    "oracle",
    "wards",
    "capsules_container_exec",
    "config_loader",
];

#[derive(Parser, Debug)]
#[command(
    name = "dockgenctl",
    version,
    about = "Generate a Dockerfile for a script and prove it builds and runs"
)]
struct Cli {
    /// Script to containerize
    #[arg(value_name = "SCRIPT")]
    script_path: PathBuf,

    /// Markdown file showing how the script is invoked
    #[arg(value_name = "EXAMPLE")]
    example_path: PathBuf,

    /// Oracle vendor: openai or google
    #[arg(long)]
    model: Option<String>,

    /// Verbose logging, including full oracle prompts and replies
    #[arg(long)]
    debug: bool,

    /// Directory under which build contexts are staged
    #[arg(long, value_name = "DIR")]
    context_root: Option<PathBuf>,

    /// Generation attempts before giving up
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// JSON secrets file consulted when API keys are not in the environment
    #[arg(long, value_name = "FILE")]
    secrets_file: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        settings.debug |= self.debug;
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(root) = &self.context_root {
            settings.context_root = root.clone();
        }
        if let Some(attempts) = self.max_attempts {
            settings.max_attempts = attempts;
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if debug { "debug" } else { "info" };
        let directives: Vec<String> = OWN_CRATES
            .iter()
            .map(|krate| format!("{krate}={level}"))
            .collect();
        EnvFilter::new(format!("warn,{}", directives.join(",")))
    });
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    let dotenv = load_dotenv();
    let settings = Settings::from_env();
    let debug = cli.debug || settings.as_ref().map(|s| s.debug).unwrap_or(false);
    init_tracing(debug);

    match dotenv {
        Ok(Some(path)) => info!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring unreadable .env"),
    }

    match run(&cli, settings) {
        Ok(report) => {
            info!(
                run_id = %report.run_id,
                attempts = report.attempts,
                runs = report.history_len,
                input_tokens = report.usage.input_tokens,
                output_tokens = report.usage.output_tokens,
                "dockgen.done"
            );
            println!("Dockerfile: {}", report.artifact_path.display());
            println!("Image: {}", report.image_tag);
        }
        Err(err) => {
            error!(error = ?err, "dockgen.failed");
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli, settings: Result<Settings, ConfigError>) -> Result<PipelineReport> {
    let mut settings = settings.context("invalid configuration")?;
    cli.apply(&mut settings);

    let model = wards::sanitize_model_name(&settings.model).ok_or_else(|| {
        anyhow!(
            "invalid model '{}' (expected one of: openai, google)",
            settings.model
        )
    })?;
    let vendor = Vendor::from_model_name(&model)?;

    let secrets = match &cli.secrets_file {
        Some(path) => EnvFileSecretProvider::with_secrets_file(path),
        None => EnvFileSecretProvider::new(),
    };
    let oracle = OracleFactory::create(vendor, &settings.oracle, &secrets, settings.debug)?;
    let sandbox = ContainerSandbox::new(&settings.container);
    info!(
        %vendor,
        runtime = sandbox.runtime(),
        context_root = %settings.context_root.display(),
        max_attempts = settings.max_attempts,
        "dockgen.start"
    );

    let mut pipeline = Pipeline::from_settings(&settings, oracle, sandbox);
    let report = pipeline.run(&cli.script_path, &cli.example_path)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_environment_settings() {
        let cli = Cli::parse_from([
            "dockgenctl",
            "a.py",
            "a.md",
            "--model",
            "google",
            "--debug",
            "--context-root",
            "out",
            "--max-attempts",
            "2",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert!(settings.debug);
        assert_eq!(settings.model, "google");
        assert_eq!(settings.context_root, PathBuf::from("out"));
        assert_eq!(settings.max_attempts, 2);
    }

    #[test]
    fn zero_attempts_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["dockgenctl", "a.py", "a.md", "--max-attempts", "0"]).is_err());
    }
}

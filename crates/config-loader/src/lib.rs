use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub mod secrets;
pub use secrets::{EnvFileSecretProvider, SecretError, SecretProvider};

pub const DEFAULT_MODEL: &str = "openai";
pub const DEFAULT_CONTEXT_ROOT: &str = "build_context";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {message}")]
    DotEnv { message: String },
}

/// Everything a run needs to know, resolved once up front and passed down
/// explicitly. Components never read the process environment themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub debug: bool,
    pub model: String,
    pub context_root: PathBuf,
    pub max_attempts: u32,
    pub container: ContainerSettings,
    pub oracle: OracleSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSettings {
    /// Binary name or path of the container CLI.
    pub runtime: String,
    pub run_timeout: Duration,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    pub pids_limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleSettings {
    pub openai_model: String,
    pub google_model: String,
    pub temperature: f32,
    pub openai_base_url: String,
    pub google_base_url: String,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            run_timeout: Duration::from_secs(300),
            cpus: None,
            memory: None,
            pids_limit: None,
        }
    }
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            openai_model: "gpt-4o-mini".to_string(),
            google_model: "gemini-1.5-pro".to_string(),
            temperature: 0.3,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            google_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            max_retries: 3,
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            model: DEFAULT_MODEL.to_string(),
            context_root: PathBuf::from(DEFAULT_CONTEXT_ROOT),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            container: ContainerSettings::default(),
            oracle: OracleSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Build settings from an arbitrary variable source. Unset or blank
    /// variables keep their defaults; malformed values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Settings::default();

        if let Some(v) = get("DOCKGEN_DEBUG") {
            settings.debug = parse_bool("DOCKGEN_DEBUG", &v)?;
        }
        if let Some(v) = get("DOCKGEN_MODEL") {
            settings.model = v;
        }
        if let Some(v) = get("DOCKGEN_CONTEXT_ROOT") {
            settings.context_root = PathBuf::from(v);
        }
        if let Some(v) = get("DOCKGEN_MAX_ATTEMPTS") {
            settings.max_attempts = parse_attempts("DOCKGEN_MAX_ATTEMPTS", &v)?;
        }

        if let Some(v) = get("DOCKGEN_CONTAINER_RUNTIME") {
            settings.container.runtime = v;
        }
        if let Some(v) = get("DOCKGEN_RUN_TIMEOUT") {
            settings.container.run_timeout = parse_duration("DOCKGEN_RUN_TIMEOUT", &v)?;
        }
        settings.container.cpus = get("DOCKGEN_CONTAINER_CPUS");
        settings.container.memory = get("DOCKGEN_CONTAINER_MEMORY");
        settings.container.pids_limit = get("DOCKGEN_CONTAINER_PIDS_LIMIT");

        if let Some(v) = get("DOCKGEN_OPENAI_MODEL") {
            settings.oracle.openai_model = v;
        }
        if let Some(v) = get("DOCKGEN_GOOGLE_MODEL") {
            settings.oracle.google_model = v;
        }
        if let Some(v) = get("DOCKGEN_TEMPERATURE") {
            settings.oracle.temperature =
                v.parse::<f32>()
                    .map_err(|e| ConfigError::InvalidValue {
                        var: "DOCKGEN_TEMPERATURE".to_string(),
                        message: e.to_string(),
                    })?;
        }
        if let Some(v) = get("DOCKGEN_OPENAI_BASE_URL") {
            settings.oracle.openai_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("DOCKGEN_GOOGLE_BASE_URL") {
            settings.oracle.google_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("DOCKGEN_ORACLE_RETRIES") {
            settings.oracle.max_retries =
                v.parse::<u32>()
                    .map_err(|e| ConfigError::InvalidValue {
                        var: "DOCKGEN_ORACLE_RETRIES".to_string(),
                        message: e.to_string(),
                    })?;
        }
        if let Some(v) = get("DOCKGEN_ORACLE_TIMEOUT") {
            settings.oracle.timeout = parse_duration("DOCKGEN_ORACLE_TIMEOUT", &v)?;
        }

        debug!(
            debug = settings.debug,
            model = %settings.model,
            context_root = %settings.context_root.display(),
            max_attempts = settings.max_attempts,
            runtime = %settings.container.runtime,
            "settings resolved"
        );
        Ok(settings)
    }
}

/// Load `.env` from the working directory if one exists. Variables already
/// present in the environment are not overridden.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Ok(Some(path))
        }
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(ConfigError::DotEnv {
            message: err.to_string(),
        }),
    }
}

pub fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

pub fn parse_attempts(var: &str, value: &str) -> Result<u32, ConfigError> {
    let attempts = value
        .trim()
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidValue {
            var: var.to_string(),
            message: e.to_string(),
        })?;
    if attempts == 0 {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: "attempt budget must be at least 1".to_string(),
        });
    }
    Ok(attempts)
}

fn parse_duration(var: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::InvalidValue {
        var: var.to_string(),
        message: e.to_string(),
    })
}

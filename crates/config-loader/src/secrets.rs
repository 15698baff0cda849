use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_SECRETS_FILE: &str = ".dockgen/secrets.json";

#[derive(Error, Debug, Clone)]
pub enum SecretError {
    #[error("Secret not found: {scope}/{key}")]
    SecretNotFound { scope: String, key: String },

    #[error("Failed to read secrets file: {path} - {message}")]
    SecretsFileError { path: String, message: String },

    #[error("Failed to parse secrets file: {message}")]
    SecretsParseError { message: String },
}

pub trait SecretProvider: Send + Sync {
    fn resolve(&self, scope: &str, key: &str) -> Result<String, SecretError>;
}

/// Vendor credentials follow the vendors' own variable names; everything
/// else uses the generic `SECRET_<SCOPE>_<KEY>` form.
fn well_known_var(scope: &str, key: &str) -> Option<&'static str> {
    match (scope, key) {
        ("openai", "api_key") => Some("OPENAI_API_KEY"),
        ("google", "api_key") => Some("GOOGLE_API_KEY"),
        _ => None,
    }
}

type SecretsByScope = HashMap<String, HashMap<String, String>>;

pub struct EnvFileSecretProvider {
    secrets_file_path: Option<PathBuf>,
    /// The file was named by the caller rather than found at the default path.
    explicit_file: bool,
    env_lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync>,
    cached_secrets: OnceCell<Result<SecretsByScope, SecretError>>,
}

impl EnvFileSecretProvider {
    pub fn new() -> Self {
        if let Ok(path) = env::var("DOCKGEN_SECRETS_FILE") {
            return Self::with_secrets_file(path);
        }
        let default_path = PathBuf::from(DEFAULT_SECRETS_FILE);
        let secrets_file_path = default_path.exists().then_some(default_path);

        Self {
            secrets_file_path,
            explicit_file: false,
            env_lookup: Box::new(|name| env::var(name).ok()),
            cached_secrets: OnceCell::new(),
        }
    }

    pub fn with_secrets_file<P: Into<PathBuf>>(secrets_file_path: P) -> Self {
        Self {
            secrets_file_path: Some(secrets_file_path.into()),
            explicit_file: true,
            env_lookup: Box::new(|name| env::var(name).ok()),
            cached_secrets: OnceCell::new(),
        }
    }

    /// Replace the environment source, mostly so tests can avoid touching
    /// process-wide state.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Box::new(lookup);
        self
    }

    fn load_secrets_from_file(&self) -> Result<SecretsByScope, SecretError> {
        let Some(ref path) = self.secrets_file_path else {
            return Ok(HashMap::new());
        };
        debug!("Loading secrets from file: {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| SecretError::SecretsFileError {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })?;

        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| SecretError::SecretsParseError {
                message: e.to_string(),
            })?;

        let mut secrets = HashMap::new();
        if let Some(obj) = parsed.as_object() {
            for (scope, scope_value) in obj {
                let Some(scope_obj) = scope_value.as_object() else {
                    continue;
                };
                let mut scope_secrets = HashMap::new();
                for (key, value) in scope_obj {
                    if let Some(string_value) = value.as_str() {
                        scope_secrets.insert(key.clone(), string_value.to_string());
                    } else {
                        warn!("Non-string value found in secrets file for {}/{}", scope, key);
                    }
                }
                secrets.insert(scope.clone(), scope_secrets);
            }
        }

        Ok(secrets)
    }

    /// A broken file at the default location is skipped with a warning; a
    /// broken file the caller named is an error.
    fn get_cached_secrets(&self) -> Result<Option<&SecretsByScope>, SecretError> {
        let loaded = self
            .cached_secrets
            .get_or_init(|| self.load_secrets_from_file());
        match loaded {
            Ok(secrets) => Ok(Some(secrets)),
            Err(e) if self.explicit_file => Err(e.clone()),
            Err(e) => {
                warn!("Failed to load secrets from file: {}", e);
                Ok(None)
            }
        }
    }

    fn lookup_env(&self, name: &str) -> Option<String> {
        (self.env_lookup)(name).filter(|v| !v.trim().is_empty())
    }
}

impl SecretProvider for EnvFileSecretProvider {
    fn resolve(&self, scope: &str, key: &str) -> Result<String, SecretError> {
        if let Some(name) = well_known_var(scope, key) {
            if let Some(value) = self.lookup_env(name) {
                debug!("Resolved secret {}/{} from {}", scope, key, name);
                return Ok(value);
            }
        }

        let env_var_name = format!("SECRET_{}_{}", scope.to_uppercase(), key.to_uppercase());
        if let Some(value) = self.lookup_env(&env_var_name) {
            debug!(
                "Resolved secret {}/{} from environment variable {}",
                scope, key, env_var_name
            );
            return Ok(value);
        }

        if let Some(value) = self
            .get_cached_secrets()?
            .and_then(|secrets| secrets.get(scope))
            .and_then(|scope_secrets| scope_secrets.get(key))
        {
            debug!("Resolved secret {}/{} from secrets file", scope, key);
            return Ok(value.clone());
        }

        Err(SecretError::SecretNotFound {
            scope: scope.to_string(),
            key: key.to_string(),
        })
    }
}

impl Default for EnvFileSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

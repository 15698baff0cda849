use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::policy::{SecurityPolicy, DEFAULT_POLICY};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid input file {}: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("security rejection: {reason}")]
    SecurityRejection { reason: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl GateError {
    fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GateError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Validation bound to one [`SecurityPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct SecurityGate<'p> {
    policy: &'p SecurityPolicy,
}

impl Default for SecurityGate<'static> {
    fn default() -> Self {
        Self {
            policy: &DEFAULT_POLICY,
        }
    }
}

impl<'p> SecurityGate<'p> {
    pub fn new(policy: &'p SecurityPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        self.policy
    }

    /// Resolve symlinks and relative segments, then require a regular file
    /// with an allowed extension that is no larger than the policy limit.
    pub fn sanitize_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, GateError> {
        let requested = path.as_ref();
        let resolved = fs::canonicalize(requested).map_err(|err| {
            warn!(path = %requested.display(), error = %err, "file not found");
            GateError::invalid(requested, format!("cannot resolve path: {err}"))
        })?;

        let metadata = fs::metadata(&resolved).map_err(|err| GateError::Io {
            path: resolved.clone(),
            source: err,
        })?;

        if !metadata.is_file() {
            warn!(path = %resolved.display(), "not a regular file");
            return Err(GateError::invalid(resolved, "not a regular file"));
        }

        let extension = resolved
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        if !self.policy.allows_extension(extension) {
            warn!(path = %resolved.display(), %extension, "invalid file extension");
            let reason = format!("extension '{extension}' is not allowed");
            return Err(GateError::invalid(resolved, reason));
        }

        if metadata.len() > self.policy.max_file_size() {
            warn!(
                path = %resolved.display(),
                size = metadata.len(),
                limit = self.policy.max_file_size(),
                "file size exceeds limit"
            );
            return Err(GateError::invalid(
                resolved,
                format!(
                    "file is {} bytes, limit is {}",
                    metadata.len(),
                    self.policy.max_file_size()
                ),
            ));
        }

        info!(path = %resolved.display(), "sanitized path");
        Ok(resolved)
    }

    /// Sanitize both inputs, then scan their full contents for injection
    /// phrasing. Nothing is sent anywhere until this returns `Ok`.
    pub fn sanitize_paths(
        &self,
        script_path: impl AsRef<Path>,
        example_path: impl AsRef<Path>,
    ) -> Result<(PathBuf, PathBuf), GateError> {
        let script = self.sanitize_path(script_path)?;
        let example = self.sanitize_path(example_path)?;

        for path in [&script, &example] {
            let content = read_lossy(path)?;
            if self.detect_prompt_injection(&content) {
                return Err(GateError::SecurityRejection {
                    reason: format!("potential prompt injection in {}", path.display()),
                });
            }
        }

        Ok((script, example))
    }

    pub fn detect_prompt_injection(&self, content: &str) -> bool {
        if self.policy.matches_injection(content) {
            warn!("potential prompt injection detected");
            true
        } else {
            debug!("no prompt injection detected");
            false
        }
    }

    pub fn sanitize_model_name(&self, model: &str) -> Option<String> {
        let normalized = model.trim().to_lowercase();
        if self.policy.allows_model(&normalized) {
            info!(model = %normalized, "sanitized model name");
            Some(normalized)
        } else {
            warn!(model = %normalized, "invalid model name");
            None
        }
    }

    /// The command comes from the oracle's reading of an untrusted example,
    /// so anything that could chain or substitute shell commands is refused.
    pub fn sanitize_test_command(&self, command: &str) -> Option<String> {
        if self.policy.matches_forbidden_command(command) {
            warn!(%command, "potential command injection detected");
            return None;
        }
        info!(%command, "sanitized test command");
        Some(command.to_string())
    }
}

fn read_lossy(path: &Path) -> Result<String, GateError> {
    let bytes = fs::read(path).map_err(|err| GateError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf, GateError> {
    SecurityGate::default().sanitize_path(path)
}

pub fn sanitize_paths(
    script_path: impl AsRef<Path>,
    example_path: impl AsRef<Path>,
) -> Result<(PathBuf, PathBuf), GateError> {
    SecurityGate::default().sanitize_paths(script_path, example_path)
}

pub fn detect_prompt_injection(content: &str) -> bool {
    SecurityGate::default().detect_prompt_injection(content)
}

pub fn sanitize_model_name(model: &str) -> Option<String> {
    SecurityGate::default().sanitize_model_name(model)
}

pub fn sanitize_test_command(command: &str) -> Option<String> {
    SecurityGate::default().sanitize_test_command(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_name_is_trimmed_and_case_folded() {
        assert_eq!(sanitize_model_name("  OpenAI "), Some("openai".to_string()));
        assert_eq!(sanitize_model_name("Google"), Some("google".to_string()));
        assert_eq!(sanitize_model_name("anthropic"), None);
        assert_eq!(sanitize_model_name(""), None);
    }

    #[test]
    fn directory_is_not_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested.py");
        fs::create_dir(&nested).unwrap();

        let err = sanitize_path(&nested).unwrap_err();
        assert!(matches!(err, GateError::InvalidInput { ref reason, .. } if reason.contains("regular file")));
    }

    #[test]
    fn disallowed_extension_names_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("tool.exe");
        fs::write(&binary, "MZ").unwrap();

        let err = SecurityGate::default().sanitize_path(&binary).unwrap_err();
        match err {
            GateError::InvalidInput { path, reason } => {
                assert_eq!(path, fs::canonicalize(&binary).unwrap());
                assert_eq!(reason, "extension 'exe' is not allowed");
            }
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_resolves_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.py");
        fs::write(&target, "print('x')").unwrap();
        let link = dir.path().join("link.py");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let resolved = sanitize_path(&link).unwrap();
        assert_eq!(resolved, fs::canonicalize(&target).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_disallowed_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("secrets.txt");
        fs::write(&target, "token").unwrap();
        let link = dir.path().join("innocent.py");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(sanitize_path(&link).is_err());
    }
}

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

/// Script and example extensions accepted by the gate (without the leading dot).
pub const ALLOWED_EXTENSIONS: [&str; 9] = ["py", "js", "rb", "sh", "php", "pl", "java", "go", "md"];

/// Model selectors the CLI accepts.
pub const ALLOWED_MODELS: [&str; 2] = ["openai", "google"];

/// 5 MiB. A file of exactly this size is accepted.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Known injection phrasings, matched case-insensitively anywhere in the text.
pub const INJECTION_PATTERNS: [&str; 8] = [
    r"ignore previous instructions",
    r"disregard (all|previous)",
    r"system message:",
    r"you are not",
    r"new role:",
    r"</?system>",
    r"</?human>",
    r"</?assistant>",
];

/// Shell metacharacters and parent-directory traversal.
pub const FORBIDDEN_COMMAND_PATTERN: &str = r"[;&|`$]|\.\./";

/// Process-wide policy. Nothing mutates it after first use.
pub static DEFAULT_POLICY: Lazy<SecurityPolicy> = Lazy::new(SecurityPolicy::standard);

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    allowed_extensions: BTreeSet<&'static str>,
    allowed_models: BTreeSet<&'static str>,
    max_file_size: u64,
    injection: Regex,
    forbidden_command: Regex,
}

impl SecurityPolicy {
    pub fn standard() -> Self {
        let joined = INJECTION_PATTERNS
            .iter()
            .map(|p| format!("(?:{p})"))
            .collect::<Vec<_>>()
            .join("|");
        let injection = RegexBuilder::new(&joined)
            .case_insensitive(true)
            .build()
            .expect("injection patterns are valid regex");
        let forbidden_command =
            Regex::new(FORBIDDEN_COMMAND_PATTERN).expect("command pattern is valid regex");

        Self {
            allowed_extensions: ALLOWED_EXTENSIONS.into_iter().collect(),
            allowed_models: ALLOWED_MODELS.into_iter().collect(),
            max_file_size: MAX_FILE_SIZE,
            injection,
            forbidden_command,
        }
    }

    /// Same policy with a different size ceiling.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.contains(extension)
    }

    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.contains(model)
    }

    pub fn matches_injection(&self, text: &str) -> bool {
        self.injection.is_match(text)
    }

    pub fn matches_forbidden_command(&self, command: &str) -> bool {
        self.forbidden_command.is_match(command)
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

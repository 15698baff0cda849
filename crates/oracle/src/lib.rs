//! Text-generation oracle.
//!
//! The oracle is a pure function of (prompt, optional system message) to
//! text. It never builds or runs anything; the caller decides what happens
//! with the text it returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod factory;
pub mod google;
mod http;
pub mod openai;
pub mod parse;
pub mod prompts;
pub mod requirements;
pub mod services;

pub use factory::OracleFactory;
pub use google::GoogleOracle;
pub use openai::OpenAiOracle;
pub use requirements::{ExecutionPattern, ExecutionStep, ScriptRequirements};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Google,
}

impl Vendor {
    /// Map an already-sanitized model selector onto a vendor.
    pub fn from_model_name(name: &str) -> Result<Self, OracleError> {
        match name {
            "openai" => Ok(Vendor::OpenAi),
            "google" => Ok(Vendor::Google),
            other => Err(OracleError::UnsupportedModel(other.to_string())),
        }
    }

    /// Scope under which the vendor's credential is resolved.
    pub fn secret_scope(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Google => "google",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.secret_scope())
    }
}

/// Token counts reported by the vendor for the most recent call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("unsupported model '{0}'")]
    UnsupportedModel(String),

    #[error("missing credential for {vendor}: {message}")]
    MissingCredential { vendor: Vendor, message: String },

    #[error("oracle request failed: {message}")]
    Http { message: String },

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("could not parse oracle response: {message}")]
    Parse { message: String },
}

impl OracleError {
    pub fn parse(message: impl Into<String>) -> Self {
        OracleError::Parse {
            message: message.into(),
        }
    }

    /// Errors caused by the content of a response rather than by the
    /// transport. Asking again can fix these.
    pub fn is_content_error(&self) -> bool {
        matches!(self, OracleError::Parse { .. } | OracleError::EmptyResponse)
    }
}

/// One conversational session with a vendor.
///
/// Calls within a session share history, so a follow-up prompt can refer to
/// earlier replies without repeating them. [`GenerationOracle::reset`] starts
/// a fresh session.
pub trait GenerationOracle {
    fn generate(&mut self, prompt: &str, system: Option<&str>) -> Result<String, OracleError>;

    /// Forget the conversation so far.
    fn reset(&mut self) {}

    fn usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

impl<T: GenerationOracle + ?Sized> GenerationOracle for Box<T> {
    fn generate(&mut self, prompt: &str, system: Option<&str>) -> Result<String, OracleError> {
        (**self).generate(prompt, system)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn usage(&self) -> TokenUsage {
        (**self).usage()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Turn {
    pub role: Role,
    pub content: String,
}

/// Message history for one session.
#[derive(Debug, Clone, Default)]
pub(crate) struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Turns to send for the next call: history plus the new system and
    /// user messages. The transcript itself is only extended once the
    /// vendor has replied.
    pub fn pending(&self, prompt: &str, system: Option<&str>) -> Vec<Turn> {
        let mut turns = self.turns.clone();
        if let Some(system) = system {
            turns.push(Turn {
                role: Role::System,
                content: system.to_string(),
            });
        }
        turns.push(Turn {
            role: Role::User,
            content: prompt.to_string(),
        });
        turns
    }

    pub fn commit(&mut self, mut sent: Vec<Turn>, reply: &str) {
        sent.push(Turn {
            role: Role::Assistant,
            content: reply.to_string(),
        });
        self.turns = sent;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_mapping_is_exact() {
        assert_eq!(Vendor::from_model_name("openai").unwrap(), Vendor::OpenAi);
        assert_eq!(Vendor::from_model_name("google").unwrap(), Vendor::Google);
        assert!(matches!(
            Vendor::from_model_name("OpenAI"),
            Err(OracleError::UnsupportedModel(_))
        ));
    }

    #[test]
    fn transcript_only_grows_after_commit() {
        let mut transcript = Transcript::default();
        let sent = transcript.pending("hi", Some("be brief"));
        assert_eq!(sent.len(), 2);
        assert_eq!(transcript.len(), 0);

        transcript.commit(sent, "hello");
        assert_eq!(transcript.len(), 3);

        let next = transcript.pending("again", None);
        assert_eq!(next.len(), 4);
        assert_eq!(next[2].role, Role::Assistant);

        transcript.clear();
        assert_eq!(transcript.len(), 0);
    }

    #[test]
    fn content_errors_are_distinguished_from_transport() {
        assert!(OracleError::parse("bad fence").is_content_error());
        assert!(OracleError::EmptyResponse.is_content_error());
        assert!(!OracleError::Status {
            status: 500,
            body: String::new()
        }
        .is_content_error());
    }
}

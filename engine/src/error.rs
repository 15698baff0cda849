use oracle::OracleError;
use thiserror::Error;
use wards::GateError;

use crate::build_context::StagingError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input validation failed: {0}")]
    InputValidation(#[source] GateError),

    #[error("security rejection: {reason}")]
    SecurityRejection { reason: String },

    #[error("generation failed: {0}")]
    Generation(#[from] OracleError),

    #[error("no working artifact after {attempts} attempts")]
    AttemptsExhausted { attempts: u32, last_error: String },

    #[error("unexpected error: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl From<GateError> for PipelineError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::SecurityRejection { reason } => PipelineError::SecurityRejection { reason },
            other => PipelineError::InputValidation(other),
        }
    }
}

impl From<StagingError> for PipelineError {
    fn from(err: StagingError) -> Self {
        PipelineError::Unexpected(anyhow::Error::new(err))
    }
}

impl PipelineError {
    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InputValidation(_) => "input_validation",
            PipelineError::SecurityRejection { .. } => "security_rejection",
            PipelineError::Generation(_) => "generation",
            PipelineError::AttemptsExhausted { .. } => "attempts_exhausted",
            PipelineError::Unexpected(_) => "unexpected",
        }
    }
}

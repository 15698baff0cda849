//! Orchestration for turning a script into a tested container build file.
//!
//! [`Pipeline`] vets the inputs, asks the oracle for requirements and a test
//! command, stages a [`BuildContext`] and hands over to [`RepairLoop`].

pub mod build_context;
pub mod error;
pub mod pipeline;
pub mod repair;

pub use build_context::{prepare, stage_artifact, BuildContext, StagingError};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineReport};
pub use repair::{LoopOutcome, LoopState, RepairLoop, DEFAULT_MAX_ATTEMPTS};

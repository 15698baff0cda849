//! Input security gate.
//!
//! Every untrusted value crossing into the pipeline (script and example paths,
//! the model selector, the test command derived by the oracle) is checked here
//! before it is read, sent to a vendor, or handed to a container runtime.
//!
//! Prompt-injection detection is a pattern heuristic and not a security
//! boundary: a paraphrased injection will pass.

pub mod gate;
pub mod policy;

pub use gate::{
    detect_prompt_injection, sanitize_model_name, sanitize_path, sanitize_paths,
    sanitize_test_command, GateError, SecurityGate,
};
pub use policy::{SecurityPolicy, DEFAULT_POLICY};

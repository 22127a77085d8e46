//! Failure taxonomy for a run.
//!
//! Per-step failures ([`StepError`], [`ToolError`], [`CodeError`]) are absorbed
//! into the step that produced them and the loop moves on. Only
//! [`RunCancelled`] escapes `run()` as an error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure recorded on an Action step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    /// The model call itself failed.
    #[error("model generation failed: {0}")]
    Generation(String),
    /// The model answered but no code block could be extracted.
    #[error("no code block found in model output")]
    NoCodeBlock,
    /// The model output was present but malformed.
    #[error("failed to parse model output: {0}")]
    Parsing(String),
    /// The code executor ran the action and reported a failure.
    #[error("code execution failed: {0}")]
    Execution(String),
    /// The code executor hit its deadline and killed the execution.
    #[error("execution timeout after {0:?}")]
    Timeout(Duration),
}

impl From<CodeError> for StepError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::Timeout(limit) => StepError::Timeout(limit),
            other => StepError::Execution(other.to_string()),
        }
    }
}

/// Failure of a single dispatched tool call. Rendered into the observation
/// text, never aborts sibling calls.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

/// Failure reported by a code executor realization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    #[error("execution timeout after {0:?}")]
    Timeout(Duration),
    #[error("interpreter exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("failed to start interpreter: {0}")]
    Spawn(String),
}

/// Returned by `run()` when the caller cancelled between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("run cancelled before step {step}")]
pub struct RunCancelled {
    pub step: u32,
}

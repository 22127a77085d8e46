//! Agents: the run loop, its options and result, callbacks and cancellation.
//!
//! [`AgentRunner`] is the only implementation shipped here; [`Agent`] exists so
//! runners (or anything else) can be nested inside another agent's toolbox.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use anyhow::Result;

use crate::core::step::Step;
use crate::core::types::{Timing, TokenUsage};

pub mod builder;
pub mod callbacks;
pub mod cancel;
pub mod prompts;
pub mod runner;

pub use builder::AgentBuilder;
pub use callbacks::{CallbackRegistry, CallbackScope};
pub use cancel::CancelToken;
pub use runner::AgentRunner;

/// Something that can be handed a task and run to a [`RunResult`].
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Run `task` to completion or budget exhaustion.
    ///
    /// Returns `Err` only for run-level failures (cancellation, re-entrant
    /// invocation). Per-step failures are recorded in the result's steps.
    fn run(&self, task: &str, options: RunOptions) -> Result<RunResult>;
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides the agent's configured step budget.
    pub max_steps: Option<u32>,
    /// Clear history and execution state before the run. Defaults to `true`.
    pub reset: bool,
    pub images: Vec<Vec<u8>>,
    /// Extra values made available to the run.
    pub extra_args: Map<String, Value>,
    pub cancel: CancelToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: None,
            reset: true,
            images: Vec::new(),
            extra_args: Map::new(),
            cancel: CancelToken::default(),
        }
    }
}

impl RunOptions {
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    pub fn with_images(mut self, images: Vec<Vec<u8>>) -> Self {
        self.images = images;
        self
    }

    pub fn with_extra_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_args.insert(key.into(), value);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Terminal state of a run that returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// A final answer was produced.
    Success,
    /// The step budget ran out first.
    MaxStepsError,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Success => "success",
            RunState::MaxStepsError => "max_steps_error",
        }
    }
}

/// Summary of one run.
///
/// `output` is `None` only when the budget ran out; a final answer of `null`
/// is `Some(Value::Null)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub output: Option<Value>,
    pub state: RunState,
    pub steps: Vec<Step>,
    pub token_usage: TokenUsage,
    pub timing: Timing,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Success
    }
}

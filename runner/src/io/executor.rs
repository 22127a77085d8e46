//! Code executor contract for the code-as-action variant.
//!
//! The [`CodeExecutor`] trait decouples the run loop from where code actually
//! runs. Both realizations ([`LocalExecutor`](crate::io::local::LocalExecutor)
//! and [`ContainerExecutor`](crate::io::container::ContainerExecutor)) render
//! the same Python harness and extract results with the same sentinel line, so
//! the runner cannot tell them apart. Tests use scripted executors that return
//! predetermined outcomes without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::protocol::{FINAL_ANSWER, RESULT_PREFIX, STATE_VAR, split_result_line};
use crate::error::CodeError;
use crate::io::process::run_with_deadline;

const HARNESS_TEMPLATE: &str = include_str!("templates/harness.py");

/// Key/value state threaded across code steps of one run.
pub type ExecutionState = Map<String, Value>;

/// Result of one code execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeOutcome {
    /// Value passed to the final-answer primitive, if it was called.
    pub output: Option<Value>,
    /// Captured stdout with the sentinel line removed.
    pub logs: String,
    pub error: Option<CodeError>,
}

impl CodeOutcome {
    pub fn failed(logs: String, error: CodeError) -> Self {
        Self {
            output: None,
            logs,
            error: Some(error),
        }
    }
}

/// Runs a code action to completion or timeout.
pub trait CodeExecutor: Send + Sync {
    /// Execute `code` with `state` injected as globals.
    fn execute(&self, code: &str, state: &ExecutionState) -> CodeOutcome;
}

/// Render the Python program that wraps `code`.
pub fn render_harness(code: &str, state: &ExecutionState) -> Result<String> {
    let state_json = serde_json::to_string(state).context("serialize execution state")?;
    // A JSON string literal is also a valid Python string literal.
    let state_literal = serde_json::to_string(&state_json).context("quote execution state")?;
    let mut env = Environment::new();
    env.add_template("harness", HARNESS_TEMPLATE)
        .context("load harness template")?;
    let rendered = env.get_template("harness")?.render(context! {
        state_var => STATE_VAR,
        state_literal => state_literal,
        final_answer => FINAL_ANSWER,
        result_prefix => RESULT_PREFIX,
        code => code,
    })?;
    Ok(rendered)
}

/// Limits shared by both realizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Feed a rendered harness to `cmd` on stdin and interpret the outcome.
pub(crate) fn run_harness(cmd: Command, script: String, limits: ExecLimits) -> CodeOutcome {
    let output = match run_with_deadline(
        cmd,
        Some(script.into_bytes()),
        limits.timeout,
        limits.output_limit_bytes,
    ) {
        Ok(output) => output,
        Err(err) => return CodeOutcome::failed(String::new(), CodeError::Spawn(format!("{err:#}"))),
    };

    if output.timed_out {
        warn!(timeout_ms = limits.timeout.as_millis() as u64, "code execution timed out");
        return CodeOutcome::failed(String::new(), CodeError::Timeout(limits.timeout));
    }

    let stdout = output.stdout_lossy();
    if !output.status.success() {
        debug!(exit_code = ?output.status.code(), "code execution failed");
        return CodeOutcome::failed(
            stdout,
            CodeError::Failed {
                code: output.status.code(),
                stderr: output.stderr_lossy().trim_end().to_string(),
            },
        );
    }

    let (value, logs) = split_result_line(&stdout);
    debug!(has_output = value.is_some(), "code execution finished");
    CodeOutcome {
        output: value,
        logs,
        error: None,
    }
}

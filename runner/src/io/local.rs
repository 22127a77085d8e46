//! Code executor that runs the harness in a local Python interpreter.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{info, instrument};

use crate::error::CodeError;
use crate::io::executor::{
    CodeExecutor, CodeOutcome, ExecLimits, ExecutionState, render_harness, run_harness,
};

pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// Spawns `<python> -` per execution and pipes the harness on stdin.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    python_path: PathBuf,
    limits: ExecLimits,
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self {
            python_path: PathBuf::from(DEFAULT_PYTHON),
            limits: ExecLimits {
                timeout: DEFAULT_TIMEOUT,
                output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            },
        }
    }
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_python_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.limits.output_limit_bytes = bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.limits.timeout
    }
}

impl CodeExecutor for LocalExecutor {
    #[instrument(skip_all, fields(python = %self.python_path.display()))]
    fn execute(&self, code: &str, state: &ExecutionState) -> CodeOutcome {
        let script = match render_harness(code, state) {
            Ok(script) => script,
            Err(err) => return CodeOutcome::failed(String::new(), CodeError::Spawn(format!("{err:#}"))),
        };
        info!(state_keys = state.len(), "running code locally");
        let mut cmd = Command::new(&self.python_path);
        cmd.arg("-");
        run_harness(cmd, script, self.limits)
    }
}

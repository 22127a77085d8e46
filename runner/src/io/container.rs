//! Code executor that runs the harness inside a throwaway Docker container.
//!
//! The container has no network, bounded memory and a CPU quota. Each
//! execution gets a unique container name so a timed-out run can be killed on
//! the daemon side, not just by killing the `docker` client.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, instrument, warn};

use crate::error::CodeError;
use crate::io::executor::{
    CodeExecutor, CodeOutcome, ExecLimits, ExecutionState, render_harness, run_harness,
};
use crate::io::local::{DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_TIMEOUT};

pub const DEFAULT_IMAGE: &str = "python:3.11-slim";
pub const DEFAULT_MEMORY: &str = "256m";
pub const DEFAULT_CPUS: &str = "0.5";

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Runs `docker run --rm -i --network=none ... <image> python3 -` per execution.
#[derive(Debug, Clone)]
pub struct ContainerExecutor {
    docker_path: PathBuf,
    image: String,
    memory: String,
    cpus: String,
    limits: ExecLimits,
}

impl Default for ContainerExecutor {
    fn default() -> Self {
        Self {
            docker_path: PathBuf::from("docker"),
            image: DEFAULT_IMAGE.to_string(),
            memory: DEFAULT_MEMORY.to_string(),
            cpus: DEFAULT_CPUS.to_string(),
            limits: ExecLimits {
                timeout: DEFAULT_TIMEOUT,
                output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            },
        }
    }
}

impl ContainerExecutor {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn with_docker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.docker_path = path.into();
        self
    }

    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    pub fn with_cpus(mut self, cpus: impl Into<String>) -> Self {
        self.cpus = cpus.into();
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

    fn run_command(&self, container_name: &str) -> Command {
        let mut cmd = Command::new(&self.docker_path);
        cmd.args(["run", "--rm", "-i", "--network=none"])
            .arg(format!("--memory={}", self.memory))
            .arg(format!("--cpus={}", self.cpus))
            .arg("--name")
            .arg(container_name)
            .arg(&self.image)
            .args(["python3", "-"]);
        cmd
    }

    fn kill_container(&self, container_name: &str) {
        match Command::new(&self.docker_path)
            .args(["kill", container_name])
            .output()
        {
            Ok(out) if out.status.success() => info!(container = container_name, "killed container"),
            Ok(out) => warn!(
                container = container_name,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "docker kill failed"
            ),
            Err(err) => warn!(container = container_name, err = %err, "could not run docker kill"),
        }
    }
}

fn unique_container_name() -> String {
    let seq = CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!("agent-exec-{}-{seq}-{nanos}", std::process::id())
}

impl CodeExecutor for ContainerExecutor {
    #[instrument(skip_all, fields(image = %self.image))]
    fn execute(&self, code: &str, state: &ExecutionState) -> CodeOutcome {
        let script = match render_harness(code, state) {
            Ok(script) => script,
            Err(err) => return CodeOutcome::failed(String::new(), CodeError::Spawn(format!("{err:#}"))),
        };
        let name = unique_container_name();
        info!(container = %name, state_keys = state.len(), "running code in container");
        let outcome = run_harness(self.run_command(&name), script, self.limits);
        if matches!(outcome.error, Some(CodeError::Timeout(_))) {
            self.kill_container(&name);
        }
        outcome
    }
}

//! Engine configuration loaded from TOML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::container::{ContainerExecutor, DEFAULT_CPUS, DEFAULT_IMAGE, DEFAULT_MEMORY};
use crate::io::executor::CodeExecutor;
use crate::io::local::{DEFAULT_OUTPUT_LIMIT_BYTES, DEFAULT_PYTHON, LocalExecutor};

/// Engine configuration (TOML).
///
/// Missing fields default to the values below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Step budget for runs that do not override it.
    pub max_steps: u32,

    /// Plan before step 1 and every `planning_interval` steps after.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_interval: Option<u32>,

    pub executor: ExecutorConfig,

    pub container: ContainerConfig,
}

/// Which code executor realization to build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Local,
    Container,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,

    /// Interpreter used by the local executor.
    pub python_path: String,

    /// Wall-clock limit for one code execution.
    pub timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerConfig {
    pub docker_path: String,
    pub image: String,
    /// Passed to `docker run --memory`.
    pub memory: String,
    /// Passed to `docker run --cpus`.
    pub cpus: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            planning_interval: None,
            executor: ExecutorConfig::default(),
            container: ContainerConfig::default(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::Local,
            python_path: DEFAULT_PYTHON.to_string(),
            timeout_secs: 30,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            docker_path: "docker".to_string(),
            image: DEFAULT_IMAGE.to_string(),
            memory: DEFAULT_MEMORY.to_string(),
            cpus: DEFAULT_CPUS.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.planning_interval == Some(0) {
            return Err(anyhow!("planning_interval must be > 0 when set"));
        }
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        if self.executor.python_path.trim().is_empty() {
            return Err(anyhow!("executor.python_path must not be empty"));
        }
        if self.container.image.trim().is_empty() {
            return Err(anyhow!("container.image must not be empty"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.executor.timeout_secs)
    }

    /// Build the configured code executor.
    pub fn build_executor(&self) -> Box<dyn CodeExecutor> {
        match self.executor.kind {
            ExecutorKind::Local => Box::new(
                LocalExecutor::new()
                    .with_python_path(&self.executor.python_path)
                    .with_timeout(self.timeout())
                    .with_output_limit(self.executor.output_limit_bytes),
            ),
            ExecutorKind::Container => Box::new(
                ContainerExecutor::new(&self.container.image)
                    .with_docker_path(&self.container.docker_path)
                    .with_memory(&self.container.memory)
                    .with_cpus(&self.container.cpus)
                    .with_timeout(self.timeout())
                    .with_output_limit(self.executor.output_limit_bytes),
            ),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/engine.toml");
        let cfg = EngineConfig {
            planning_interval: Some(3),
            executor: ExecutorConfig {
                kind: ExecutorKind::Container,
                ..ExecutorConfig::default()
            },
            ..EngineConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.toml");
        fs::write(&path, "max_steps = 5\n[executor]\ntimeout_secs = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_steps, 5);
        assert_eq!(cfg.timeout(), Duration::from_secs(2));
        assert_eq!(cfg.executor.python_path, DEFAULT_PYTHON);
        assert_eq!(cfg.container.image, DEFAULT_IMAGE);
    }

    #[test]
    fn rejects_zero_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("engine.toml");
        fs::write(&path, "[executor]\ntimeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_zero_planning_interval() {
        let cfg = EngineConfig {
            planning_interval: Some(0),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}

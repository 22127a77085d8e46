//! Command-line entry point.
//!
//! There is no model client here; the CLI exercises the pieces that do not need
//! one: running code through the configured executor, extracting code blocks
//! from model text, and printing the effective configuration.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use agent_runner::core::parse::extract_code_block;
use agent_runner::io::config::{EngineConfig, load_config};
use agent_runner::io::executor::ExecutionState;
use agent_runner::logging;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;

const DEFAULT_CONFIG_PATH: &str = "agent-runner.toml";

#[derive(Parser)]
#[command(
    name = "agent-runner",
    version,
    about = "Autonomous agent run loop: code execution and parsing tools"
)]
struct Cli {
    /// Debug logging for this crate (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a Python file through the configured executor.
    Exec {
        /// File containing the code to run.
        file: PathBuf,
        /// Config file (defaults apply when missing).
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// JSON object injected as variables before the code runs.
        #[arg(short, long)]
        state: Option<String>,
    },
    /// Read model output on stdin and print the code block it contains.
    Extract,
    /// Print the effective configuration as TOML.
    Config {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    if let Err(err) = run(cli.command) {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Exec {
            file,
            config,
            state,
        } => cmd_exec(&file, &config, state.as_deref()),
        Command::Extract => cmd_extract(),
        Command::Config { path } => cmd_config(&path),
    }
}

fn cmd_exec(file: &Path, config_path: &Path, state: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let code = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let state = parse_state(state)?;

    let outcome = config.build_executor().execute(&code, &state);
    if !outcome.logs.is_empty() {
        println!("{}", outcome.logs);
    }
    if let Some(err) = outcome.error {
        bail!(err);
    }
    if let Some(output) = outcome.output {
        println!("Output: {}", render_output(&output));
    }
    Ok(())
}

fn cmd_extract() -> Result<()> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("read stdin")?;
    match extract_code_block(&text) {
        Some(code) => {
            println!("{code}");
            Ok(())
        }
        None => bail!("no code block found"),
    }
}

fn cmd_config(path: &Path) -> Result<()> {
    let config: EngineConfig = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("serialize config toml")?;
    print!("{rendered}");
    Ok(())
}

/// Parse `--state` as a JSON object; absent means empty.
fn parse_state(raw: Option<&str>) -> Result<ExecutionState> {
    let Some(raw) = raw else {
        return Ok(ExecutionState::new());
    };
    match serde_json::from_str::<Value>(raw).context("parse --state json")? {
        Value::Object(map) => Ok(map),
        other => bail!("--state must be a JSON object, got {other}"),
    }
}

fn render_output(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

//! Development-time tracing for debugging runs.
//!
//! The library only emits `tracing` events (spans per run, step and code
//! execution); the binary decides whether and how they are printed.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the stderr subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `warn`, or
/// `agent_runner=debug` with `verbose`.
///
/// # Example
/// ```bash
/// RUST_LOG=agent_runner::io=debug agent-runner exec script.py
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "warn,agent_runner=debug" } else { "warn" }
}

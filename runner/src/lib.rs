//! Autonomous agent run loop.
//!
//! Given a task, an [`agent::AgentRunner`] repeatedly asks a language model for
//! the next action, carries it out, and feeds the observation back until a
//! final answer is produced or the step budget runs out. Actions are either
//! structured tool calls or Python code run by a [`io::executor::CodeExecutor`].
//!
//! - **[`core`]**: Pure, deterministic logic (messages, steps, history, parsing).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (child processes, containers, config).
//! - **[`tools`]** and **[`agent`]** tie the two together; [`model`] is the
//!   contract with the language-model client.

pub mod agent;
pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;

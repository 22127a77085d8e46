//! Side-effecting pieces: process execution, code executors, configuration.

pub mod config;
pub mod container;
pub mod executor;
pub mod local;
pub mod process;

//! Command-line interface for crusty.
//!
//! Provides the worker server plus client commands for queueing and
//! inspecting articles.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};

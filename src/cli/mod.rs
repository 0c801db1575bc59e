//! Command-line interface for stats-cache.
//!
//! Provides the long-running `serve` command, one-shot administrative
//! operations and schema migration.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, AdminCommand, Cli, Commands};

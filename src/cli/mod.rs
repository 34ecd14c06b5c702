//! Sessioncore CLI - command-line interface.
//!
//! Provides a single binary entry point for:
//! - `sessioncore start` - Start a session core node
//! - `sessioncore check-config` - Validate a configuration file

mod args;
pub mod commands;

pub use args::{CheckConfigArgs, Cli, Commands, OutputFormat, StartArgs};

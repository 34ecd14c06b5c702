//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sessioncore - session consistency and last-will delivery for a clustered MQTT broker.
#[derive(Parser)]
#[command(name = "sessioncore")]
#[command(version)]
#[command(about = "Session core node and configuration tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a session core node
    Start(StartArgs),

    /// Load and validate a configuration file
    CheckConfig(CheckConfigArgs),
}

// -----------------------------------------------------------------------------
// Start command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct StartArgs {
    /// Path to configuration file (falls back to SESSIONCORE_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured log filter
    #[arg(long)]
    pub log_level: Option<String>,
}

// -----------------------------------------------------------------------------
// Check-config command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to configuration file (falls back to SESSIONCORE_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format for the effective configuration
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

//! Sessioncore - unified CLI entrypoint.
//!
//! Usage:
//!   sessioncore start --config config/sessioncore.toml
//!   sessioncore check-config --config config/sessioncore.toml --format json

use anyhow::Result;
use clap::Parser;
use sessioncore::cli::commands::{run_check_config, run_start};
use sessioncore::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(args).await,
        Commands::CheckConfig(args) => run_check_config(args),
    }
}

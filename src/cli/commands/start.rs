//! Start command - launches a session core node.

use super::load_config;
use crate::cli::args::StartArgs;
use crate::runtime::{Runtime, RuntimeDeps};
use crate::telemetry;
use anyhow::Result;

pub async fn run_start(args: StartArgs) -> Result<()> {
    let config = load_config(args.config)?;
    let level = args.log_level.or_else(|| config.telemetry.log_level.clone());
    let log_handle = telemetry::init_tracing(level.as_deref())?;
    let runtime = Runtime::new(config, RuntimeDeps::default())?.with_log_handle(log_handle);
    runtime.run().await
}

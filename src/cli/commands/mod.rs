//! CLI command implementations.

mod check;
mod start;

pub use check::{render_config, run_check_config};
pub use start::run_start;

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_with_overrides(path),
        None => Config::load_from_env(),
    }
}

//! Check-config command - validates a configuration file and prints the
//! effective settings.

use super::load_config;
use crate::cli::args::{CheckConfigArgs, OutputFormat};
use crate::config::Config;
use anyhow::{Context, Result};

pub fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = load_config(args.config)?;
    config.validate().context("configuration is invalid")?;
    println!("{}", render_config(&config, args.format)?);
    Ok(())
}

pub fn render_config(config: &Config, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(config).context("failed to encode configuration")
        }
        OutputFormat::Text => Ok(format!(
            "service_id: {}\nqueue.partitions: {}\nqueue.cluster_event_topic: {}\nqueue.publish_msg_topic: {}\nqueue.poll_timeout_ms: {}\nqueue.max_poll_records: {}\nwill.scheduler_name: {}\ntelemetry.log_level: {}",
            config.service_id,
            config.queue.partitions,
            config.queue.cluster_event_topic,
            config.queue.publish_msg_topic,
            config.queue.poll_timeout_ms,
            config.queue.max_poll_records,
            config.will.scheduler_name,
            config.telemetry.log_level.as_deref().unwrap_or("info"),
        )),
    }
}

use anyhow::{Context, Result};
use serde::Serialize;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

pub type LogHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Initialize JSON logging with reloadable level.
pub fn init_tracing(log_level: Option<&str>) -> Result<LogHandle> {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init tracing: {e}"))?;
    Ok(handle)
}

/// Swap the active filter, e.g. `debug` or `sessioncore::mqtt=trace`.
pub fn set_log_level(handle: &LogHandle, level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log filter {level}"))?;
    handle
        .modify(|f| *f = filter)
        .context("failed to reload log filter")?;
    tracing::info!(level, "log level updated");
    Ok(())
}

/// Point-in-time view of the session core's gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub service_id: String,
    pub pending_wills: usize,
    pub scheduled_wills: usize,
    pub cluster_events_handled: u64,
}

impl StatsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Plain-text exposition, one gauge per line.
    pub fn render(&self) -> String {
        format!(
            "sessioncore_last_will_pending{{service=\"{0}\"}} {1}\nsessioncore_last_will_scheduled{{service=\"{0}\"}} {2}\nsessioncore_cluster_events_handled_total{{service=\"{0}\"}} {3}\n",
            self.service_id, self.pending_wills, self.scheduled_wills, self.cluster_events_handled
        )
    }
}

/// In-memory JSON log sink for unit tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    buf: std::sync::Arc<parking_lot::Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl std::io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl LogCapture {
    pub(crate) fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// Events at `level` whose message contains `needle`.
    pub(crate) fn count(&self, level: &str, needle: &str) -> usize {
        let buf = self.buf.lock();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter(|record| record["level"] == level)
            .filter(|record| {
                record["fields"]["message"]
                    .as_str()
                    .is_some_and(|message| message.contains(needle))
            })
            .count()
    }
}

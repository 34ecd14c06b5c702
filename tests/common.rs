//! Common test harness utilities for integration tests.
//!
//! This module provides:
//! - A recording dispatcher that acknowledges (or fails) every publish
//! - Spy authentication providers with call counters
//! - Session and will builders
//! - A JSON log capture for asserting on emitted events
//! - A manually advanced clock

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sessioncore::auth::{AuthContext, AuthProvider, AuthResponse, ProviderFault};
use sessioncore::mqtt::{ClientType, MsgDispatcher, PublishMsg, Qos, SessionInfo};
use sessioncore::queue::{QueueCallback, QueueError, QueueMsgMetadata};
use sessioncore::time::Clock;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Sleep};
use tracing::subscriber::DefaultGuard;

/// Records every persisted publish and completes its callback.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(SessionInfo, PublishMsg)>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::default(),
            fail: true,
        })
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent(&self) -> Vec<(SessionInfo, PublishMsg)> {
        self.sent.lock().clone()
    }
}

impl MsgDispatcher for RecordingDispatcher {
    fn persist_publish_msg(&self, session_info: &SessionInfo, msg: PublishMsg, callback: QueueCallback) {
        let mut sent = self.sent.lock();
        sent.push((session_info.clone(), msg));
        if self.fail {
            callback.on_failure(QueueError::SendFailed("publish topic unavailable".into()));
        } else {
            callback.on_success(QueueMsgMetadata {
                topic: "publish.msg".into(),
                partition: 0,
                offset: (sent.len() - 1) as u64,
            });
        }
    }
}

#[derive(Clone, Copy)]
pub enum Verdict {
    Accept(ClientType),
    Reject,
    Fault,
}

/// Provider returning a fixed verdict and counting invocations.
pub struct SpyProvider {
    name: String,
    verdict: Verdict,
    calls: AtomicUsize,
}

impl SpyProvider {
    pub fn new(name: &str, verdict: Verdict) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            verdict,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for SpyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, _ctx: &AuthContext) -> Result<AuthResponse, ProviderFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.verdict {
            Verdict::Accept(client_type) => Ok(AuthResponse::success(client_type)),
            Verdict::Reject => Ok(AuthResponse::failure()),
            Verdict::Fault => Err(ProviderFault::Internal(anyhow::anyhow!("provider crashed"))),
        }
    }
}

pub fn session(service_id: &str, client_id: &str, clean_start: bool) -> SessionInfo {
    SessionInfo::new(service_id, client_id, ClientType::Device, clean_start)
}

pub fn will_msg(client_id: &str, delay_secs: Option<u32>) -> PublishMsg {
    let msg = PublishMsg::new(format!("devices/{client_id}/status"), "offline", Qos::AtLeastOnce);
    match delay_secs {
        Some(secs) => msg.with_will_delay(secs),
        None => msg,
    }
}

/// Let spawned tasks and the scheduler worker run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Wait for a condition, advancing (paused) time in small steps.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    condition()
}

/// Buffer receiving JSON log lines from a thread-local subscriber.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Install a capturing subscriber for the current thread. Spawned tasks
    /// are captured too on the current-thread test runtime.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        let buf = self.buf.lock();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Events at `level` whose message contains `needle`.
    pub fn count(&self, level: &str, needle: &str) -> usize {
        self.records()
            .iter()
            .filter(|record| record["level"] == level)
            .filter(|record| {
                record["fields"]["message"]
                    .as_str()
                    .is_some_and(|message| message.contains(needle))
            })
            .count()
    }
}

/// Clock that only moves when the test advances it. Sleepers re-check it
/// every tick.
#[derive(Clone)]
pub struct TestClock {
    now: Arc<Mutex<Instant>>,
}

impl TestClock {
    const TICK: Duration = Duration::from_millis(100);

    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }

    fn sleep_until(&self, deadline: Instant) -> Sleep {
        let remaining = deadline.saturating_duration_since(self.now());
        tokio::time::sleep(remaining.min(Self::TICK))
    }
}

//! Retained message processing applied to retained will messages before dispatch.

use crate::mqtt::protocol::{PublishMsg, Qos};
use crate::time::unix_millis;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Synchronous transform run on a retained publish before it is dispatched.
pub trait RetainedMsgProcessor: Send + Sync {
    fn process(&self, msg: PublishMsg) -> PublishMsg;
}

/// Passes messages through untouched; used when no retained store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetained;

impl RetainedMsgProcessor for NoopRetained {
    fn process(&self, msg: PublishMsg) -> PublishMsg {
        msg
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedRecord {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    /// Store time, ms since epoch.
    pub retained_at: u64,
}

#[derive(Default)]
struct RetainedState {
    messages: BTreeMap<String, RetainedRecord>,
    total_bytes: u64,
}

/// Retained store keyed by topic (BTreeMap for deterministic ordering).
///
/// An empty payload clears the topic's retained message and the processed
/// message leaves with its retain flag cleared.
#[derive(Default)]
pub struct MemoryRetainedProcessor {
    state: RwLock<RetainedState>,
}

impl MemoryRetainedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(&self, topic: &str) -> Option<RetainedRecord> {
        self.state.read().messages.get(topic).cloned()
    }

    pub fn count(&self) -> usize {
        self.state.read().messages.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.read().total_bytes
    }

    fn store(&self, msg: &PublishMsg) {
        let mut state = self.state.write();
        let record = RetainedRecord {
            topic: msg.topic_name.clone(),
            payload: msg.payload.clone(),
            qos: msg.qos,
            retained_at: unix_millis(),
        };
        if let Some(old) = state.messages.insert(msg.topic_name.clone(), record) {
            state.total_bytes = state.total_bytes.saturating_sub(old.payload.len() as u64);
        }
        state.total_bytes = state.total_bytes.saturating_add(msg.payload.len() as u64);
    }

    fn clear(&self, topic: &str) {
        let mut state = self.state.write();
        if let Some(old) = state.messages.remove(topic) {
            state.total_bytes = state.total_bytes.saturating_sub(old.payload.len() as u64);
        }
    }
}

impl RetainedMsgProcessor for MemoryRetainedProcessor {
    fn process(&self, msg: PublishMsg) -> PublishMsg {
        if msg.payload.is_empty() {
            tracing::trace!(topic = %msg.topic_name, "clearing retained message");
            self.clear(&msg.topic_name);
            return msg.with_retain(false);
        }
        tracing::trace!(topic = %msg.topic_name, "storing retained message");
        self.store(&msg);
        msg
    }
}

//! Queue envelopes and delivery metadata.

use crate::queue::error::{QueueError, QueueResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type QueueMsgHeaders = BTreeMap<String, Vec<u8>>;

/// Serialized record as stored by a queue backend. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMsg {
    pub key: String,
    pub headers: QueueMsgHeaders,
    pub data: Bytes,
}

/// Where a record landed in the log; used for acknowledgment and commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueMsgMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

/// Typed message; the value is bincode-encoded on send and decoded on poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoQueueMsg<T> {
    pub key: String,
    pub headers: QueueMsgHeaders,
    pub value: T,
}

impl<T> ProtoQueueMsg<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            headers: QueueMsgHeaders::new(),
            value,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl<T: Serialize> ProtoQueueMsg<T> {
    pub fn encode(&self, topic: &str) -> QueueResult<QueueMsg> {
        let data = bincode::serialize(&self.value).map_err(|err| QueueError::Encode {
            topic: topic.to_string(),
            reason: err.to_string(),
        })?;
        Ok(QueueMsg {
            key: self.key.clone(),
            headers: self.headers.clone(),
            data: Bytes::from(data),
        })
    }
}

impl<T: DeserializeOwned> ProtoQueueMsg<T> {
    pub fn decode(msg: &QueueMsg, metadata: &QueueMsgMetadata) -> QueueResult<Self> {
        let value = bincode::deserialize(&msg.data).map_err(|err| QueueError::Decode {
            topic: metadata.topic.clone(),
            partition: metadata.partition,
            offset: metadata.offset,
            reason: err.to_string(),
        })?;
        Ok(Self {
            key: msg.key.clone(),
            headers: msg.headers.clone(),
            value,
        })
    }
}

/// A decoded record returned from a consumer poll.
#[derive(Debug, Clone)]
pub struct Received<T> {
    pub metadata: QueueMsgMetadata,
    pub msg: ProtoQueueMsg<T>,
}

impl<T> Received<T> {
    pub fn value(&self) -> &T {
        &self.msg.value
    }

    pub fn into_value(self) -> T {
        self.msg.value
    }
}

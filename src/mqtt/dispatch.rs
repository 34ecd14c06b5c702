//! Message dispatch boundary: hands publish messages to the persistence path.

use crate::core::config::QueueConfig;
use crate::mqtt::protocol::PublishMsg;
use crate::mqtt::session::{ClientType, SessionInfo};
use crate::queue::{InMemoryLog, ProtoQueueMsg, QueueCallback, QueueError, QueueProducer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Asynchronous failure to persist a publish, as observed through its callback.
#[derive(Debug, Error)]
#[error("failed to persist publish msg for session {session_id}: {source}")]
pub struct DispatchFailure {
    pub session_id: Uuid,
    pub source: QueueError,
}

/// Accepts a publish plus its session context and acknowledges through the
/// callback. Implementations must not block the caller on acknowledgement.
pub trait MsgDispatcher: Send + Sync {
    fn persist_publish_msg(&self, session_info: &SessionInfo, msg: PublishMsg, callback: QueueCallback);
}

/// Record written to the publish-msg topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMsgProto {
    pub service_id: String,
    pub session_id: Uuid,
    pub client_id: String,
    pub client_type: ClientType,
    pub msg: PublishMsg,
}

impl PublishMsgProto {
    pub fn new(session_info: &SessionInfo, msg: PublishMsg) -> Self {
        Self {
            service_id: session_info.service_id.clone(),
            session_id: session_info.session_id,
            client_id: session_info.client_id().to_string(),
            client_type: session_info.client_info.client_type,
            msg,
        }
    }
}

/// Dispatcher that appends publishes to a queue topic, keyed by MQTT topic
/// so one topic's messages stay ordered within a partition.
pub struct QueueMsgDispatcher {
    producer: Box<dyn QueueProducer<PublishMsgProto>>,
}

impl QueueMsgDispatcher {
    pub fn new(producer: Box<dyn QueueProducer<PublishMsgProto>>) -> Self {
        Self { producer }
    }

    pub fn in_memory(log: &Arc<InMemoryLog>, queue: &QueueConfig, service_id: &str) -> Self {
        Self::new(Box::new(log.create_producer::<PublishMsgProto>(
            queue.publish_msg_topic.clone(),
            format!("publish-msg-producer-{service_id}"),
        )))
    }

    pub fn init(&self) -> Result<(), QueueError> {
        self.producer.init()
    }

    pub fn topic(&self) -> &str {
        self.producer.default_topic()
    }

    pub fn stop(&self) {
        self.producer.stop();
    }
}

impl MsgDispatcher for QueueMsgDispatcher {
    fn persist_publish_msg(&self, session_info: &SessionInfo, msg: PublishMsg, callback: QueueCallback) {
        let key = msg.topic_name.clone();
        let record = ProtoQueueMsg::new(key, PublishMsgProto::new(session_info, msg));
        self.producer.send(record, Some(callback));
    }
}

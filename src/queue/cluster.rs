//! Cluster event channel: session lifecycle notifications shared by every node.

use crate::core::config::QueueConfig;
use crate::queue::channel::{ControlledOffsetConsumer, QueueProducer};
use crate::queue::memory::InMemoryLog;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Events exchanged between broker nodes over the cluster event topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    SessionConnected {
        client_id: String,
        session_id: Uuid,
        service_id: String,
        clean_start: bool,
    },
    SessionDisconnected {
        client_id: String,
        session_id: Uuid,
        service_id: String,
    },
    /// Administrative removal of a client's session state.
    ClearSession { client_id: String },
}

impl ClusterEvent {
    pub fn client_id(&self) -> &str {
        match self {
            Self::SessionConnected { client_id, .. }
            | Self::SessionDisconnected { client_id, .. }
            | Self::ClearSession { client_id } => client_id,
        }
    }

    /// Node that produced the event, if it carries one.
    pub fn service_id(&self) -> Option<&str> {
        match self {
            Self::SessionConnected { service_id, .. }
            | Self::SessionDisconnected { service_id, .. } => Some(service_id),
            Self::ClearSession { .. } => None,
        }
    }
}

pub type EventProducer = Box<dyn QueueProducer<ClusterEvent>>;
pub type EventConsumer = Box<dyn ControlledOffsetConsumer<ClusterEvent>>;

/// Creates the producer/consumer pair bound to the cluster event topic.
pub trait ClusterEventQueueFactory: Send + Sync {
    fn create_event_producer(&self, service_id: &str) -> EventProducer;

    fn create_event_consumer(&self, service_id: &str) -> EventConsumer;
}

pub fn event_producer_id(service_id: &str) -> String {
    format!("cluster-event-producer-{service_id}")
}

/// One consumer group per node so every node observes every event.
pub fn event_consumer_group(service_id: &str) -> String {
    format!("cluster-event-consumer-{service_id}")
}

pub struct InMemoryClusterEventQueueFactory {
    log: Arc<InMemoryLog>,
    topic: String,
}

impl InMemoryClusterEventQueueFactory {
    pub fn new(log: Arc<InMemoryLog>, topic: impl Into<String>) -> Self {
        Self {
            log,
            topic: topic.into(),
        }
    }

    pub fn from_config(log: Arc<InMemoryLog>, queue: &QueueConfig) -> Self {
        Self::new(log, queue.cluster_event_topic.clone())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl ClusterEventQueueFactory for InMemoryClusterEventQueueFactory {
    fn create_event_producer(&self, service_id: &str) -> EventProducer {
        Box::new(
            self.log
                .create_producer::<ClusterEvent>(self.topic.clone(), event_producer_id(service_id)),
        )
    }

    fn create_event_consumer(&self, service_id: &str) -> EventConsumer {
        Box::new(
            self.log
                .create_consumer::<ClusterEvent>(self.topic.clone(), event_consumer_group(service_id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::message::ProtoQueueMsg;
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_node_sees_every_event() {
        let factory = InMemoryClusterEventQueueFactory::new(InMemoryLog::new(2), "cluster.events");
        let producer = factory.create_event_producer("node-a");
        producer.init().unwrap();
        let event = ClusterEvent::ClearSession {
            client_id: "c1".into(),
        };
        producer.send(ProtoQueueMsg::new("c1", event.clone()), None);

        for node in ["node-a", "node-b"] {
            let consumer = factory.create_event_consumer(node);
            assert_eq!(consumer.group_id(), format!("cluster-event-consumer-{node}"));
            consumer.subscribe().unwrap();
            let batch = consumer.poll(8, Duration::from_millis(10)).await.unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].value(), &event);
        }
    }

    #[test]
    fn test_event_accessors() {
        let event = ClusterEvent::SessionConnected {
            client_id: "c1".into(),
            session_id: Uuid::new_v4(),
            service_id: "node-a".into(),
            clean_start: true,
        };
        assert_eq!(event.client_id(), "c1");
        assert_eq!(event.service_id(), Some("node-a"));
        let clear = ClusterEvent::ClearSession {
            client_id: "c2".into(),
        };
        assert_eq!(clear.service_id(), None);
    }
}

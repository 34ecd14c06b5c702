pub mod callback;
pub mod channel;
pub mod cluster;
pub mod error;
pub mod memory;
pub mod message;

pub use callback::{QueueAck, QueueCallback};
pub use channel::{ControlledOffsetConsumer, QueueProducer};
pub use cluster::{ClusterEvent, ClusterEventQueueFactory, InMemoryClusterEventQueueFactory};
pub use error::{QueueError, QueueResult};
pub use memory::{InMemoryConsumer, InMemoryLog, InMemoryProducer};
pub use message::{ProtoQueueMsg, QueueMsg, QueueMsgHeaders, QueueMsgMetadata, Received};

//! Producer and consumer contracts the broker core depends on.
//!
//! Backends (in-memory log, external durable logs) implement these traits;
//! nothing above this layer depends on a concrete transport.

use crate::queue::callback::QueueCallback;
use crate::queue::error::QueueResult;
use crate::queue::message::{ProtoQueueMsg, Received};
use async_trait::async_trait;
use std::time::Duration;

/// Writes typed messages to a topic.
pub trait QueueProducer<T>: Send + Sync {
    /// Topic used by [`QueueProducer::send`].
    fn default_topic(&self) -> &str;

    /// Prepare the producer (create the topic if the backend needs it).
    fn init(&self) -> QueueResult<()>;

    /// Send to the default topic. The callback, if any, fires exactly once.
    fn send(&self, msg: ProtoQueueMsg<T>, callback: Option<QueueCallback>) {
        let topic = self.default_topic().to_string();
        self.send_to(&topic, msg, callback);
    }

    fn send_to(&self, topic: &str, msg: ProtoQueueMsg<T>, callback: Option<QueueCallback>);

    /// Stop the producer; later sends fail through their callback.
    fn stop(&self);
}

/// Reads typed messages with caller-controlled offset commits.
///
/// Reading never moves the committed position. A consumer that stops after
/// `poll` but before `commit` sees the same records again when its group
/// resubscribes.
#[async_trait]
pub trait ControlledOffsetConsumer<T>: Send + Sync {
    fn topic(&self) -> &str;

    fn group_id(&self) -> &str;

    /// Start reading from the group's committed offsets.
    fn subscribe(&self) -> QueueResult<()>;

    /// Return up to `max_records`, waiting at most `timeout` for the first one.
    async fn poll(&self, max_records: usize, timeout: Duration) -> QueueResult<Vec<Received<T>>>;

    /// Commit everything returned by polls so far.
    fn commit(&self) -> QueueResult<()>;

    /// Commit `offset` as the next offset to read on `partition`.
    fn commit_offset(&self, partition: u32, offset: u64) -> QueueResult<()>;

    fn unsubscribe(&self);
}

//! In-memory partitioned log backend.
//!
//! Topics are created on demand with a fixed partition count; records are
//! placed by xxHash64 of their key so one key always lands on one partition.
//! Committed offsets are kept per (group, topic, partition). Retention is
//! unbounded, this backend is meant for single-process clusters and tests.

use crate::queue::callback::QueueCallback;
use crate::queue::channel::{ControlledOffsetConsumer, QueueProducer};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::message::{ProtoQueueMsg, QueueMsg, QueueMsgMetadata, Received};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use twox_hash::XxHash64;

type CommitKey = (String, String, u32);

struct TopicLog {
    partitions: Vec<Mutex<Vec<QueueMsg>>>,
    appended: Notify,
}

impl TopicLog {
    fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
            appended: Notify::new(),
        }
    }
}

pub struct InMemoryLog {
    partitions: u32,
    topics: RwLock<HashMap<String, Arc<TopicLog>>>,
    committed: Mutex<HashMap<CommitKey, u64>>,
}

impl InMemoryLog {
    pub fn new(partitions: u32) -> Arc<Self> {
        Arc::new(Self {
            partitions: partitions.max(1),
            topics: RwLock::new(HashMap::new()),
            committed: Mutex::new(HashMap::new()),
        })
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    fn topic(&self, name: &str) -> Arc<TopicLog> {
        if let Some(topic) = self.topics.read().get(name) {
            return topic.clone();
        }
        self.topics
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicLog::new(self.partitions)))
            .clone()
    }

    pub fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(key.as_bytes());
        (hasher.finish() % u64::from(self.partitions)) as u32
    }

    /// Append a record and wake any waiting pollers.
    pub fn append(&self, topic: &str, msg: QueueMsg) -> QueueMsgMetadata {
        let log = self.topic(topic);
        let partition = self.partition_for(&msg.key);
        let offset = {
            let mut records = log.partitions[partition as usize].lock();
            records.push(msg);
            (records.len() - 1) as u64
        };
        log.appended.notify_waiters();
        QueueMsgMetadata {
            topic: topic.to_string(),
            partition,
            offset,
        }
    }

    /// Offset one past the last record of a partition.
    pub fn end_offset(&self, topic: &str, partition: u32) -> QueueResult<u64> {
        let log = self.topic(topic);
        let records = log
            .partitions
            .get(partition as usize)
            .ok_or_else(|| QueueError::PartitionOutOfRange {
                topic: topic.to_string(),
                partition,
            })?;
        let len = records.lock().len() as u64;
        Ok(len)
    }

    /// Total records across all partitions of a topic.
    pub fn len(&self, topic: &str) -> usize {
        self.topic(topic)
            .partitions
            .iter()
            .map(|records| records.lock().len())
            .sum()
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    pub fn committed_offset(&self, group_id: &str, topic: &str, partition: u32) -> Option<u64> {
        self.committed
            .lock()
            .get(&(group_id.to_string(), topic.to_string(), partition))
            .copied()
    }

    fn commit(&self, group_id: &str, topic: &str, partition: u32, offset: u64) {
        self.committed
            .lock()
            .insert((group_id.to_string(), topic.to_string(), partition), offset);
    }

    pub fn create_producer<T>(
        self: &Arc<Self>,
        topic: impl Into<String>,
        client_id: impl Into<String>,
    ) -> InMemoryProducer<T> {
        InMemoryProducer {
            log: self.clone(),
            topic: topic.into(),
            client_id: client_id.into(),
            stopped: AtomicBool::new(false),
            _marker: PhantomData,
        }
    }

    pub fn create_consumer<T>(
        self: &Arc<Self>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> InMemoryConsumer<T> {
        InMemoryConsumer {
            log: self.clone(),
            topic: topic.into(),
            group_id: group_id.into(),
            state: Mutex::new(ConsumerState::default()),
            _marker: PhantomData,
        }
    }
}

pub struct InMemoryProducer<T> {
    log: Arc<InMemoryLog>,
    topic: String,
    client_id: String,
    stopped: AtomicBool,
    _marker: PhantomData<fn(T)>,
}

impl<T> InMemoryProducer<T> {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl<T: Serialize> QueueProducer<T> for InMemoryProducer<T> {
    fn default_topic(&self) -> &str {
        &self.topic
    }

    fn init(&self) -> QueueResult<()> {
        self.log.topic(&self.topic);
        Ok(())
    }

    fn send_to(&self, topic: &str, msg: ProtoQueueMsg<T>, callback: Option<QueueCallback>) {
        let result = if self.stopped.load(Ordering::Acquire) {
            Err(QueueError::ProducerStopped {
                topic: topic.to_string(),
            })
        } else {
            msg.encode(topic).map(|raw| self.log.append(topic, raw))
        };
        match &result {
            Ok(meta) => tracing::trace!(
                producer = %self.client_id,
                topic,
                partition = meta.partition,
                offset = meta.offset,
                "record appended"
            ),
            Err(err) => tracing::debug!(producer = %self.client_id, topic, "send failed: {err}"),
        }
        if let Some(callback) = callback {
            callback.complete(result);
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[derive(Default)]
struct ConsumerState {
    subscribed: bool,
    positions: Vec<u64>,
    polled: HashMap<u32, u64>,
    next_partition: usize,
}

pub struct InMemoryConsumer<T> {
    log: Arc<InMemoryLog>,
    topic: String,
    group_id: String,
    state: Mutex<ConsumerState>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> InMemoryConsumer<T> {
    fn fetch(&self, log: &TopicLog, max_records: usize) -> QueueResult<Vec<Received<T>>> {
        let mut state = self.state.lock();
        if !state.subscribed {
            return Err(QueueError::NotSubscribed {
                topic: self.topic.clone(),
            });
        }
        let count = log.partitions.len();
        let start = state.next_partition % count;
        let mut batch = Vec::new();
        for step in 0..count {
            if batch.len() >= max_records {
                break;
            }
            let partition = (start + step) % count;
            let records = log.partitions[partition].lock();
            let mut position = state.positions[partition];
            while (position as usize) < records.len() && batch.len() < max_records {
                let metadata = QueueMsgMetadata {
                    topic: self.topic.clone(),
                    partition: partition as u32,
                    offset: position,
                };
                match ProtoQueueMsg::decode(&records[position as usize], &metadata) {
                    Ok(msg) => batch.push(Received { metadata, msg }),
                    Err(err) => tracing::error!(group = %self.group_id, "skipping undecodable record: {err}"),
                }
                position += 1;
            }
            if position != state.positions[partition] {
                state.positions[partition] = position;
                state.polled.insert(partition as u32, position);
            }
        }
        state.next_partition = (start + 1) % count;
        Ok(batch)
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> ControlledOffsetConsumer<T> for InMemoryConsumer<T> {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn subscribe(&self) -> QueueResult<()> {
        let partitions = self.log.topic(&self.topic).partitions.len() as u32;
        let positions = (0..partitions)
            .map(|p| {
                self.log
                    .committed_offset(&self.group_id, &self.topic, p)
                    .unwrap_or(0)
            })
            .collect();
        let mut state = self.state.lock();
        state.positions = positions;
        state.polled.clear();
        state.subscribed = true;
        tracing::debug!(group = %self.group_id, topic = %self.topic, "consumer subscribed");
        Ok(())
    }

    async fn poll(&self, max_records: usize, timeout: Duration) -> QueueResult<Vec<Received<T>>> {
        let log = self.log.topic(&self.topic);
        let deadline = Instant::now() + timeout;
        loop {
            let appended = log.appended.notified();
            let batch = self.fetch(&log, max_records)?;
            if !batch.is_empty() || max_records == 0 {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    fn commit(&self) -> QueueResult<()> {
        let mut state = self.state.lock();
        if !state.subscribed {
            return Err(QueueError::NotSubscribed {
                topic: self.topic.clone(),
            });
        }
        for (partition, offset) in state.polled.drain() {
            self.log
                .commit(&self.group_id, &self.topic, partition, offset);
        }
        Ok(())
    }

    fn commit_offset(&self, partition: u32, offset: u64) -> QueueResult<()> {
        if partition >= self.log.partitions {
            return Err(QueueError::PartitionOutOfRange {
                topic: self.topic.clone(),
                partition,
            });
        }
        self.log.commit(&self.group_id, &self.topic, partition, offset);
        Ok(())
    }

    fn unsubscribe(&self) {
        let mut state = self.state.lock();
        state.subscribed = false;
        state.positions.clear();
        state.polled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(key: &str, value: &str) -> ProtoQueueMsg<String> {
        ProtoQueueMsg::new(key, value.to_string())
    }

    #[test]
    fn test_same_key_same_partition() {
        let log = InMemoryLog::new(8);
        let a = log.partition_for("client-1");
        assert_eq!(a, log.partition_for("client-1"));
        assert!(a < 8);
    }

    #[test]
    fn test_end_offset_per_partition() {
        let log = InMemoryLog::new(4);
        let partition = log.partition_for("client-7");
        let meta = log.append("events", ProtoQueueMsg::new("client-7", 7u32).encode("events").unwrap());
        assert_eq!(meta.partition, partition);
        assert_eq!(log.end_offset("events", partition).unwrap(), 1);
        let other = (partition + 1) % 4;
        assert_eq!(log.end_offset("events", other).unwrap(), 0);
        assert!(matches!(
            log.end_offset("events", 4),
            Err(QueueError::PartitionOutOfRange { partition: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_send_reports_metadata() {
        let log = InMemoryLog::new(1);
        let producer = log.create_producer::<String>("events", "p1");
        producer.init().unwrap();
        let (callback, ack) = QueueCallback::channel();
        producer.send(msg("k", "one"), Some(callback));
        let meta = ack.wait().await.unwrap();
        assert_eq!(meta.topic, "events");
        assert_eq!(meta.partition, 0);
        assert_eq!(meta.offset, 0);
        assert_eq!(log.end_offset("events", 0).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stopped_producer_fails_callback() {
        let log = InMemoryLog::new(1);
        let producer = log.create_producer::<String>("events", "p1");
        producer.stop();
        let (callback, ack) = QueueCallback::channel();
        producer.send(msg("k", "one"), Some(callback));
        assert!(matches!(
            ack.wait().await,
            Err(QueueError::ProducerStopped { .. })
        ));
        assert!(log.is_empty("events"));
    }

    #[tokio::test]
    async fn test_poll_requires_subscription() {
        let log = InMemoryLog::new(1);
        let consumer = log.create_consumer::<String>("events", "g1");
        let err = consumer
            .poll(10, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotSubscribed { .. }));
    }

    #[tokio::test]
    async fn test_uncommitted_records_are_redelivered() {
        let log = InMemoryLog::new(2);
        let producer = log.create_producer::<String>("events", "p1");
        for i in 0..4 {
            producer.send(msg(&format!("k{i}"), &format!("v{i}")), None);
        }

        let first = log.create_consumer::<String>("events", "g1");
        first.subscribe().unwrap();
        let batch = first.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 4);
        drop(first);

        let second = log.create_consumer::<String>("events", "g1");
        second.subscribe().unwrap();
        let again = second.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(again.len(), 4);
        second.commit().unwrap();

        let third = log.create_consumer::<String>("events", "g1");
        third.subscribe().unwrap();
        let rest = third.poll(10, Duration::from_millis(10)).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_groups_have_independent_offsets() {
        let log = InMemoryLog::new(1);
        let producer = log.create_producer::<String>("events", "p1");
        producer.send(msg("k", "v"), None);

        for group in ["node-a", "node-b"] {
            let consumer = log.create_consumer::<String>("events", group);
            consumer.subscribe().unwrap();
            let batch = consumer.poll(10, Duration::from_millis(10)).await.unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].value(), "v");
            consumer.commit().unwrap();
        }
        assert_eq!(log.committed_offset("node-a", "events", 0), Some(1));
        assert_eq!(log.committed_offset("node-b", "events", 0), Some(1));
    }

    #[tokio::test]
    async fn test_commit_offset_rewinds() {
        let log = InMemoryLog::new(1);
        let producer = log.create_producer::<String>("events", "p1");
        producer.send(msg("k", "a"), None);
        producer.send(msg("k", "b"), None);

        let consumer = log.create_consumer::<String>("events", "g");
        consumer.subscribe().unwrap();
        consumer.poll(10, Duration::from_millis(5)).await.unwrap();
        consumer.commit_offset(0, 1).unwrap();
        assert!(consumer.commit_offset(3, 0).is_err());

        consumer.subscribe().unwrap();
        let batch = consumer.poll(10, Duration::from_millis(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value(), "b");
    }

    #[tokio::test]
    async fn test_poll_wakes_on_append() {
        let log = InMemoryLog::new(1);
        let consumer = log.create_consumer::<String>("events", "g");
        consumer.subscribe().unwrap();
        let producer = log.create_producer::<String>("events", "p");

        let waiter = tokio::spawn(async move {
            consumer.poll(1, Duration::from_secs(5)).await.unwrap()
        });
        tokio::task::yield_now().await;
        producer.send(msg("k", "late"), None);
        let batch = waiter.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].metadata.offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_empty() {
        let log = InMemoryLog::new(1);
        let consumer = log.create_consumer::<String>("events", "g");
        consumer.subscribe().unwrap();
        let batch = consumer.poll(5, Duration::from_millis(50)).await.unwrap();
        assert!(batch.is_empty());
    }
}

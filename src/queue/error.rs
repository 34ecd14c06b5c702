//! Queue error types.

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("producer for topic {topic} is stopped")]
    ProducerStopped { topic: String },

    #[error("consumer for topic {topic} is not subscribed")]
    NotSubscribed { topic: String },

    #[error("partition {partition} out of range for topic {topic}")]
    PartitionOutOfRange { topic: String, partition: u32 },

    #[error("failed to encode message for topic {topic}: {reason}")]
    Encode { topic: String, reason: String },

    #[error("failed to decode message at {topic}/{partition}@{offset}: {reason}")]
    Decode {
        topic: String,
        partition: u32,
        offset: u64,
        reason: String,
    },

    #[error("completion callback dropped before acknowledgement")]
    CallbackDropped,

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

//! Publish message model shared by will delivery and dispatch.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// MQTT 5.0 properties carried by a publish (or will) message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishProperties {
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    /// Will Delay Interval (0x18), seconds. Only meaningful on will messages.
    pub will_delay_interval: Option<u32>,
    pub user_properties: Vec<(String, String)>,
}

/// A publish message as handed to the dispatch path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishMsg {
    pub topic_name: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retained: bool,
    pub properties: PublishProperties,
}

impl PublishMsg {
    pub fn new(topic_name: impl Into<String>, payload: impl Into<Bytes>, qos: Qos) -> Self {
        Self {
            topic_name: topic_name.into(),
            payload: payload.into(),
            qos,
            retained: false,
            properties: PublishProperties::default(),
        }
    }

    pub fn with_retain(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }

    pub fn with_properties(mut self, properties: PublishProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_will_delay(mut self, seconds: u32) -> Self {
        self.properties.will_delay_interval = Some(seconds);
        self
    }

    /// Will delay in whole seconds; an absent property means no delay.
    pub fn will_delay_secs(&self) -> u32 {
        self.properties.will_delay_interval.unwrap_or(0)
    }
}

//! # Relay Message Structures
//!
//! Messages as received from a source queue, as held in flight by the relay,
//! and as published to a destination topic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A single message attribute: a declared data type plus a string or binary value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttribute {
    /// Declared type, e.g. "String", "Number", "Binary"
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_value: Option<Vec<u8>>,
}

impl MessageAttribute {
    pub fn string(data_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    pub fn binary(value: Vec<u8>) -> Self {
        Self {
            data_type: "Binary".to_string(),
            string_value: None,
            binary_value: Some(value),
        }
    }
}

pub type MessageAttributes = HashMap<String, MessageAttribute>;

/// Message returned by a queue receive
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Queue-assigned message id, used for logging only
    pub message_id: String,
    pub body: String,
    pub attributes: MessageAttributes,
    /// Opaque handle required to delete this delivery from the source
    pub receipt_handle: String,
    /// Group/partition key, when the source queue carries one
    pub group_id: Option<String>,
}

/// A received message owned by the relay until it is delivered or abandoned
#[derive(Debug, Clone)]
pub struct InFlightMessage {
    pub message: QueueMessage,
    /// Wall-clock time the message was pulled from the queue
    pub received_at: DateTime<Utc>,
    received_instant: Instant,
}

impl InFlightMessage {
    /// Wrap a queue message, stamping it with the current time
    pub fn new(message: QueueMessage) -> Self {
        Self {
            message,
            received_at: Utc::now(),
            received_instant: Instant::now(),
        }
    }

    /// Time elapsed since the message was pulled from the queue
    pub fn elapsed(&self) -> Duration {
        self.received_instant.elapsed()
    }

    pub fn message_id(&self) -> &str {
        &self.message.message_id
    }
}

/// Request to publish one message to a topic
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub topic: String,
    pub body: String,
    pub attributes: Option<MessageAttributes>,
    pub group_id: Option<String>,
}

impl PublishRequest {
    /// Build a publish request for a received message.
    ///
    /// Attributes are copied one-to-one when `copy_attributes` is set; the group
    /// key is carried over when `copy_group_id` is set.
    pub fn from_message(
        topic: &str,
        message: &QueueMessage,
        copy_attributes: bool,
        copy_group_id: bool,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            body: message.body.clone(),
            attributes: copy_attributes.then(|| message.attributes.clone()),
            group_id: if copy_group_id {
                message.group_id.clone()
            } else {
                None
            },
        }
    }
}

/// Topic-assigned id of a published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: String,
}

/// JSON envelope stored in backends that carry only a JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub body: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: MessageAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl RelayEnvelope {
    /// Interpret an arbitrary JSON payload as an envelope.
    ///
    /// Payloads written by other producers are relayed verbatim: a JSON string
    /// becomes the body as-is, any other non-envelope value is serialized.
    pub fn from_json(value: serde_json::Value) -> Self {
        let body = match value {
            serde_json::Value::String(body) => body,
            value => {
                if value.get("body").is_some_and(|b| b.is_string()) {
                    if let Ok(envelope) = serde_json::from_value::<Self>(value.clone()) {
                        return envelope;
                    }
                }
                value.to_string()
            }
        };
        Self {
            body,
            attributes: HashMap::new(),
            group_id: None,
        }
    }
}

impl From<&PublishRequest> for RelayEnvelope {
    fn from(request: &PublishRequest) -> Self {
        Self {
            body: request.body.clone(),
            attributes: request.attributes.clone().unwrap_or_default(),
            group_id: request.group_id.clone(),
        }
    }
}

//! # Messaging Error Types
//!
//! Errors returned by queue and topic clients. The pipeline treats every one of
//! them as transient: it logs, counts, records health and retries after a cooldown.

use thiserror::Error;

/// Messaging error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    #[error("Receive failed on queue {queue_name}: {message}")]
    Receive { queue_name: String, message: String },

    #[error("Publish failed on topic {topic}: {message}")]
    Publish { topic: String, message: String },

    #[error("Delete failed on queue {queue_name} for handle {receipt_handle}: {message}")]
    Delete {
        queue_name: String,
        receipt_handle: String,
        message: String,
    },

    #[error("Connection error: {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("Client configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    /// Create a receive error
    pub fn receive(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Receive {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a delete error
    pub fn delete(
        queue_name: impl Into<String>,
        receipt_handle: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Delete {
            queue_name: queue_name.into(),
            receipt_handle: receipt_handle.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a client configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

//! # Messaging Module
//!
//! Source queue and destination topic clients for the relay. Pipelines see only
//! the [`QueueClient`] and [`TopicClient`] capabilities; the backend behind them
//! (pgmq in production, in-memory for local runs and tests) is chosen per
//! pipeline by a [`ClientFactory`].

pub mod client;
pub mod errors;
pub mod memory_client;
pub mod message;
#[cfg(feature = "pgmq")]
pub mod pgmq_client;

pub use client::{BackendClientFactory, ClientFactory, QueueClient, TopicClient};
pub use errors::{MessagingError, MessagingResult};
pub use memory_client::{MemoryBroker, MemoryQueue, MemoryTopic, PublishedMessage};
pub use message::*;
#[cfg(feature = "pgmq")]
pub use pgmq_client::{PgmqConnections, PgmqQueueClient, PgmqTopicClient};

//! # Queue and Topic Client Capabilities
//!
//! The relay talks to its source and destination only through these traits.
//! Production (pgmq) and in-memory implementations sit behind the same
//! interface and are chosen per pipeline by a [`ClientFactory`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{ClientBackend, PipelineConfig};
use crate::messaging::errors::MessagingResult;
use crate::messaging::memory_client::MemoryBroker;
use crate::messaging::message::{PublishReceipt, PublishRequest, QueueMessage};

/// Pull-based source queue bound to a single queue
#[async_trait]
pub trait QueueClient: Send + Sync + fmt::Debug {
    /// Receive up to `max_messages` (1-10), long-polling for at most `wait`
    async fn receive(&self, max_messages: u8, wait: Duration) -> MessagingResult<Vec<QueueMessage>>;

    /// Delete a delivered message by its receipt handle
    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()>;
}

/// Publish-based destination topic
#[async_trait]
pub trait TopicClient: Send + Sync + fmt::Debug {
    async fn publish(&self, request: PublishRequest) -> MessagingResult<PublishReceipt>;
}

/// Builds the client pair for one pipeline
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn queue_client(&self, config: &PipelineConfig) -> MessagingResult<Arc<dyn QueueClient>>;

    async fn topic_client(&self, config: &PipelineConfig) -> MessagingResult<Arc<dyn TopicClient>>;
}

/// Factory that dispatches on each pipeline's configured backend
#[derive(Debug, Clone, Default)]
pub struct BackendClientFactory {
    memory: MemoryBroker,
    #[cfg(feature = "pgmq")]
    pgmq: crate::messaging::pgmq_client::PgmqConnections,
}

impl BackendClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing broker for the memory backend (shared with tests or tooling)
    pub fn with_memory_broker(broker: MemoryBroker) -> Self {
        Self {
            memory: broker,
            ..Self::default()
        }
    }

    pub fn memory_broker(&self) -> &MemoryBroker {
        &self.memory
    }
}

#[async_trait]
impl ClientFactory for BackendClientFactory {
    async fn queue_client(&self, config: &PipelineConfig) -> MessagingResult<Arc<dyn QueueClient>> {
        info!(
            queue_id = %config.id,
            queue = %config.queue,
            backend = %config.backend,
            "Creating queue client"
        );

        match &config.backend {
            ClientBackend::Memory => Ok(self
                .memory
                .queue_with_visibility(&config.queue, config.visibility_timeout)),
            #[cfg(feature = "pgmq")]
            ClientBackend::Pgmq { database_url } => {
                let client = self
                    .pgmq
                    .queue_client(database_url, &config.queue, config.visibility_timeout)
                    .await?;
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "pgmq"))]
            ClientBackend::Pgmq { .. } => Err(pgmq_disabled()),
        }
    }

    async fn topic_client(&self, config: &PipelineConfig) -> MessagingResult<Arc<dyn TopicClient>> {
        info!(
            queue_id = %config.id,
            topic = %config.topic,
            backend = %config.backend,
            "Creating topic client"
        );

        match &config.backend {
            ClientBackend::Memory => Ok(self.memory.topic(&config.topic)),
            #[cfg(feature = "pgmq")]
            ClientBackend::Pgmq { database_url } => {
                let client = self.pgmq.topic_client(database_url, &config.topic).await?;
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "pgmq"))]
            ClientBackend::Pgmq { .. } => Err(pgmq_disabled()),
        }
    }
}

#[cfg(not(feature = "pgmq"))]
fn pgmq_disabled() -> crate::messaging::MessagingError {
    crate::messaging::MessagingError::configuration(
        "backend",
        "pgmq backend requested but the crate was built without the `pgmq` feature",
    )
}

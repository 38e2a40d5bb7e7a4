//! # PostgreSQL Message Queue Clients (pgmq-rs)
//!
//! Production queue and topic clients built on the pgmq-rs crate. The source is a
//! pgmq queue read with a visibility timeout; the destination topic is a pgmq
//! queue receiving a JSON [`RelayEnvelope`] per published message.

use async_trait::async_trait;
use dashmap::DashMap;
use pgmq::{types::Message, PGMQueue};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::redact_url;
use crate::messaging::client::{QueueClient, TopicClient};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::message::{PublishReceipt, PublishRequest, QueueMessage, RelayEnvelope};

/// Interval between polls while long-polling an empty queue
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Connection pool size per database URL
const MAX_CONNECTIONS: u32 = 10;

/// Shared connection pools, one per database URL
#[derive(Debug, Clone, Default)]
pub struct PgmqConnections {
    pools: Arc<DashMap<String, PGMQueue>>,
}

impl PgmqConnections {
    async fn connect(&self, database_url: &str) -> MessagingResult<PGMQueue> {
        if let Some(pgmq) = self.pools.get(database_url) {
            return Ok(pgmq.clone());
        }

        info!("🚀 Connecting to pgmq");
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(|e| MessagingError::connection(redact_url(database_url), e.to_string()))?;

        let pgmq = PGMQueue::new_with_pool(pool).await;
        info!("✅ Connected to pgmq");

        // Another pipeline may have connected concurrently; keep the first pool.
        Ok(self
            .pools
            .entry(database_url.to_string())
            .or_insert(pgmq)
            .clone())
    }

    /// Create a client for one source queue
    pub async fn queue_client(
        &self,
        database_url: &str,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> MessagingResult<PgmqQueueClient> {
        let pgmq = self.connect(database_url).await?;
        Ok(PgmqQueueClient::new(pgmq, queue_name, visibility_timeout))
    }

    /// Create a client for one destination topic
    pub async fn topic_client(&self, database_url: &str, topic: &str) -> MessagingResult<PgmqTopicClient> {
        let pgmq = self.connect(database_url).await?;
        Ok(PgmqTopicClient::new(pgmq, topic))
    }
}

/// pgmq-backed source queue
#[derive(Debug, Clone)]
pub struct PgmqQueueClient {
    pgmq: PGMQueue,
    queue_name: String,
    visibility_timeout_seconds: i32,
}

impl PgmqQueueClient {
    pub fn new(pgmq: PGMQueue, queue_name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            pgmq,
            queue_name: queue_name.into(),
            visibility_timeout_seconds: i32::try_from(visibility_timeout.as_secs().max(1))
                .unwrap_or(i32::MAX),
        }
    }

    /// Create the queue if it doesn't exist
    pub async fn create_queue(&self) -> MessagingResult<()> {
        self.pgmq
            .create(&self.queue_name)
            .await
            .map_err(|e| MessagingError::receive(&self.queue_name, format!("create failed: {e}")))
    }

    /// Send one envelope to this queue, returning the pgmq message id
    pub async fn send(&self, envelope: &RelayEnvelope) -> MessagingResult<i64> {
        self.pgmq
            .send(&self.queue_name, envelope)
            .await
            .map_err(|e| MessagingError::publish(&self.queue_name, e.to_string()))
    }

    /// Send several envelopes in one round trip
    pub async fn send_batch(&self, envelopes: &[RelayEnvelope]) -> MessagingResult<Vec<i64>> {
        self.pgmq
            .send_batch(&self.queue_name, envelopes)
            .await
            .map_err(|e| MessagingError::publish(&self.queue_name, e.to_string()))
    }

    fn to_queue_message(message: Message<serde_json::Value>) -> QueueMessage {
        let envelope = RelayEnvelope::from_json(message.message);
        QueueMessage {
            message_id: message.msg_id.to_string(),
            body: envelope.body,
            attributes: envelope.attributes,
            receipt_handle: message.msg_id.to_string(),
            group_id: envelope.group_id,
        }
    }
}

#[async_trait]
impl QueueClient for PgmqQueueClient {
    async fn receive(&self, max_messages: u8, wait: Duration) -> MessagingResult<Vec<QueueMessage>> {
        debug!(
            "📥 Reading messages from queue: {} (limit: {}, wait: {:?})",
            self.queue_name, max_messages, wait
        );

        let messages: Vec<Message<serde_json::Value>> = self
            .pgmq
            .read_batch_with_poll(
                &self.queue_name,
                Some(self.visibility_timeout_seconds),
                i32::from(max_messages.clamp(1, 10)),
                Some(wait),
                Some(POLL_INTERVAL),
            )
            .await
            .map_err(|e| MessagingError::receive(&self.queue_name, e.to_string()))?
            .unwrap_or_default();

        Ok(messages.into_iter().map(Self::to_queue_message).collect())
    }

    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()> {
        let msg_id: i64 = receipt_handle.parse().map_err(|_| {
            MessagingError::delete(&self.queue_name, receipt_handle, "receipt handle is not a pgmq msg_id")
        })?;

        debug!("🗑️ Deleting message {} from queue: {}", msg_id, self.queue_name);

        self.pgmq
            .delete(&self.queue_name, msg_id)
            .await
            .map(|_| ())
            .map_err(|e| MessagingError::delete(&self.queue_name, receipt_handle, e.to_string()))
    }
}

/// pgmq-backed destination topic
#[derive(Debug, Clone)]
pub struct PgmqTopicClient {
    pgmq: PGMQueue,
    topic: String,
}

impl PgmqTopicClient {
    pub fn new(pgmq: PGMQueue, topic: impl Into<String>) -> Self {
        Self {
            pgmq,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl TopicClient for PgmqTopicClient {
    async fn publish(&self, request: PublishRequest) -> MessagingResult<PublishReceipt> {
        let envelope = RelayEnvelope::from(&request);
        let msg_id = self
            .pgmq
            .send(&self.topic, &envelope)
            .await
            .map_err(|e| MessagingError::publish(&self.topic, e.to_string()))?;

        Ok(PublishReceipt {
            message_id: msg_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_queue_message_uses_msg_id_as_receipt_handle() {
        let message = Message {
            msg_id: 42,
            vt: chrono::Utc::now(),
            read_ct: 1,
            enqueued_at: chrono::Utc::now(),
            message: json!({"body": "hello", "group_id": "g"}),
        };

        let queue_message = PgmqQueueClient::to_queue_message(message);
        assert_eq!(queue_message.message_id, "42");
        assert_eq!(queue_message.receipt_handle, "42");
        assert_eq!(queue_message.body, "hello");
        assert_eq!(queue_message.group_id.as_deref(), Some("g"));
    }

    #[tokio::test]
    async fn test_pgmq_round_trip() {
        // This test requires a PostgreSQL database with pgmq extension
        let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
            println!("Skipping pgmq test - no TEST_DATABASE_URL provided");
            return;
        };

        let connections = PgmqConnections::default();
        let queue = connections
            .queue_client(&database_url, "relay_round_trip_src", Duration::from_secs(30))
            .await
            .expect("Failed to create queue client");
        queue.create_queue().await.expect("Failed to create queue");
        queue
            .send(&RelayEnvelope::from_json(json!("round trip")))
            .await
            .expect("Failed to send");

        let received = queue.receive(10, Duration::from_secs(1)).await.expect("receive");
        assert!(!received.is_empty());
        for message in received {
            queue.delete(&message.receipt_handle).await.expect("delete");
        }
    }
}

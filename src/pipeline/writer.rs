//! Topic writer: drains the pipeline buffer, publishing each message and then
//! deleting it from the source queue.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::context::{DeliveryOutcome, PipelineContext};
use crate::messaging::{InFlightMessage, PublishRequest};

/// One writer task of a pipeline
#[derive(Debug)]
pub struct Writer {
    id: usize,
    context: Arc<PipelineContext>,
}

impl Writer {
    pub fn new(id: usize, context: Arc<PipelineContext>) -> Self {
        Self { id, context }
    }

    /// Deliver buffered messages until shutdown
    pub async fn run(self) {
        let context = &self.context;
        let queue_id = context.queue_id();

        info!(queue = %queue_id, writer = self.id, "Writer started");

        loop {
            let popped = tokio::select! {
                _ = context.shutdown.cancelled() => break,
                popped = context.buffer.pop() => popped,
            };
            let Some(in_flight) = popped else {
                break;
            };
            context.update_buffer_gauge();

            let Some(outcome) = self.deliver(&in_flight).await else {
                break;
            };

            context.record(&outcome);

            if let Some(cooldown) = outcome.cooldown(&context.config) {
                if !context.cooldown(cooldown).await {
                    break;
                }
            }
        }

        info!(queue = %queue_id, writer = self.id, "Writer stopped");
    }

    /// Publish then delete one message
    ///
    /// Delete is attempted only after a successful publish. A failed message is
    /// dropped here and comes back through the source visibility timeout.
    /// Returns `None` when shutdown interrupts the delivery.
    pub async fn deliver(&self, in_flight: &InFlightMessage) -> Option<DeliveryOutcome> {
        let context = &self.context;
        let config = &context.config;
        let queue_id = context.queue_id();
        let message = &in_flight.message;

        let request = PublishRequest::from_message(
            &config.topic,
            message,
            config.copy_attributes,
            config.copy_message_group_id,
        );

        let published = tokio::select! {
            _ = context.shutdown.cancelled() => return None,
            published = context.topic.publish(request) => published,
        };

        let receipt = match published {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    queue = %queue_id,
                    writer = self.id,
                    message_id = %message.message_id,
                    error = %e,
                    cooldown = ?config.error_cooldown_write,
                    "Publish failed"
                );
                return Some(DeliveryOutcome::PublishFailed(e));
            }
        };

        let deleted = tokio::select! {
            _ = context.shutdown.cancelled() => return None,
            deleted = context.queue.delete(&message.receipt_handle) => deleted,
        };

        if let Err(e) = deleted {
            error!(
                queue = %queue_id,
                writer = self.id,
                message_id = %message.message_id,
                error = %e,
                cooldown = ?config.error_cooldown_delete,
                "Delete failed"
            );
            return Some(DeliveryOutcome::DeleteFailed(e));
        }

        let latency = in_flight.elapsed();
        if config.debug {
            info!(
                queue = %queue_id,
                writer = self.id,
                message_id = %message.message_id,
                published_id = %receipt.message_id,
                latency = ?latency,
                "Delivered message"
            );
        } else {
            debug!(
                queue = %queue_id,
                writer = self.id,
                message_id = %message.message_id,
                published_id = %receipt.message_id,
                latency = ?latency,
                "Delivered message"
            );
        }

        Some(DeliveryOutcome::Delivered { latency })
    }
}

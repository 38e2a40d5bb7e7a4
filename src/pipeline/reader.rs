//! Queue reader: pulls batches from the source queue into the pipeline buffer.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::context::{DeliveryOutcome, PipelineContext};
use crate::messaging::InFlightMessage;

/// One reader task of a pipeline
#[derive(Debug)]
pub struct Reader {
    id: usize,
    context: Arc<PipelineContext>,
}

impl Reader {
    pub fn new(id: usize, context: Arc<PipelineContext>) -> Self {
        Self { id, context }
    }

    /// Receive and buffer until shutdown
    ///
    /// Receive failures and empty receives are followed by their cooldown and
    /// retried forever. A full buffer suspends the reader, and with it the
    /// receive calls.
    pub async fn run(self) {
        let context = &self.context;
        let config = &context.config;
        let queue_id = context.queue_id();

        info!(queue = %queue_id, reader = self.id, "Reader started");

        'receive: loop {
            let received = tokio::select! {
                _ = context.shutdown.cancelled() => break,
                received = context.queue.receive(config.max_number_of_messages, config.wait_time()) => {
                    context.metrics.inc_receive();
                    received
                }
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    error!(
                        queue = %queue_id,
                        reader = self.id,
                        error = %e,
                        cooldown = ?config.error_cooldown_read,
                        "Receive failed"
                    );
                    context.record(&DeliveryOutcome::ReceiveFailed(e));
                    if !context.cooldown(config.error_cooldown_read).await {
                        break;
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                context.metrics.inc_receive_empty();
                debug!(
                    queue = %queue_id,
                    reader = self.id,
                    cooldown = ?config.empty_receive_cooldown,
                    "Empty receive"
                );
                if !context.cooldown(config.empty_receive_cooldown).await {
                    break;
                }
                continue;
            }

            context.metrics.add_receive_messages(messages.len());
            debug!(queue = %queue_id, reader = self.id, count = messages.len(), "Received messages");

            for message in messages {
                if config.debug {
                    info!(
                        queue = %queue_id,
                        reader = self.id,
                        message_id = %message.message_id,
                        attributes = ?message.attributes,
                        body = %message.body,
                        "Buffering message"
                    );
                }

                let pushed = tokio::select! {
                    _ = context.shutdown.cancelled() => break 'receive,
                    pushed = context.buffer.push(InFlightMessage::new(message)) => pushed,
                };
                if pushed.is_err() {
                    break 'receive;
                }
                context.update_buffer_gauge();
            }
        }

        info!(queue = %queue_id, reader = self.id, "Reader stopped");
    }
}

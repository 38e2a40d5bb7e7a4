//! State shared by every reader and writer of one pipeline, and the outcome
//! bookkeeping they all go through.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::buffer::MessageBuffer;
use crate::config::PipelineConfig;
use crate::health::HealthTracker;
use crate::messaging::{MessagingError, QueueClient, TopicClient};
use crate::metrics::PipelineMetrics;

/// Result of one pass through a reader or writer loop
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Published and deleted; `latency` runs from receive to delete
    Delivered { latency: Duration },
    ReceiveFailed(MessagingError),
    PublishFailed(MessagingError),
    DeleteFailed(MessagingError),
}

impl DeliveryOutcome {
    /// Cooldown to observe after this outcome, if any
    pub fn cooldown(&self, config: &PipelineConfig) -> Option<Duration> {
        match self {
            Self::Delivered { .. } => None,
            Self::ReceiveFailed(_) => Some(config.error_cooldown_read),
            Self::PublishFailed(_) => Some(config.error_cooldown_write),
            Self::DeleteFailed(_) => Some(config.error_cooldown_delete),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Everything a pipeline's tasks share
#[derive(Debug)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub queue: Arc<dyn QueueClient>,
    pub topic: Arc<dyn TopicClient>,
    pub buffer: MessageBuffer,
    pub metrics: PipelineMetrics,
    pub health: Arc<HealthTracker>,
    pub shutdown: CancellationToken,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        queue: Arc<dyn QueueClient>,
        topic: Arc<dyn TopicClient>,
        metrics: PipelineMetrics,
        shutdown: CancellationToken,
    ) -> Self {
        let buffer = MessageBuffer::new(config.buffer);
        Self {
            config,
            queue,
            topic,
            buffer,
            metrics,
            health: Arc::new(HealthTracker::new()),
            shutdown,
        }
    }

    pub fn queue_id(&self) -> &str {
        &self.config.id
    }

    /// Apply an outcome to metrics and health
    pub fn record(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered { latency } => {
                self.metrics.record_delivery(*latency);
                self.health.clear();
            }
            DeliveryOutcome::ReceiveFailed(error) => {
                self.metrics.inc_receive_error();
                self.health.record_error(error);
            }
            DeliveryOutcome::PublishFailed(error) => {
                self.metrics.inc_publish_error();
                self.health.record_error(error);
            }
            DeliveryOutcome::DeleteFailed(error) => {
                self.metrics.inc_delete_error();
                self.health.record_error(error);
            }
        }
    }

    /// Sleep for `duration` unless shutdown comes first; false means shut down
    pub async fn cooldown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Publish the buffer occupancy gauge
    pub fn update_buffer_gauge(&self) {
        self.metrics.set_buffer(self.buffer.len());
    }
}

//! Pipeline supervisor.
//!
//! A [`Relay`] owns one [`Pipeline`] per configured queue. Pipelines share
//! nothing with each other; the relay only builds them, starts their tasks and
//! hands out the shutdown signal.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::context::PipelineContext;
use super::reader::Reader;
use super::writer::Writer;
use crate::config::PipelineConfig;
use crate::error::{RelayError, Result};
use crate::health::{AggregateHealthProbe, HealthTracker};
use crate::messaging::{ClientFactory, QueueClient, TopicClient};
use crate::metrics::{PipelineMetrics, RelayMetrics};

/// Reader pool, buffer and writer pool for one queue-to-topic mapping
#[derive(Debug, Clone)]
pub struct Pipeline {
    context: Arc<PipelineContext>,
}

impl Pipeline {
    /// Wire a pipeline around existing clients
    pub fn new(
        config: PipelineConfig,
        queue: Arc<dyn QueueClient>,
        topic: Arc<dyn TopicClient>,
        metrics: PipelineMetrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            context: Arc::new(PipelineContext::new(config, queue, topic, metrics, shutdown)),
        }
    }

    /// Create the pipeline's clients through `factory` and wire the pipeline
    pub async fn build(
        config: PipelineConfig,
        factory: &dyn ClientFactory,
        metrics: &RelayMetrics,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let queue = factory
            .queue_client(&config)
            .await
            .map_err(|e| RelayError::pipeline(&config.id, format!("queue client: {e}")))?;
        let topic = factory
            .topic_client(&config)
            .await
            .map_err(|e| RelayError::pipeline(&config.id, format!("topic client: {e}")))?;
        let pipeline_metrics = metrics.pipeline(&config.id);

        Ok(Self::new(config, queue, topic, pipeline_metrics, shutdown))
    }

    pub fn id(&self) -> &str {
        self.context.queue_id()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.context.config
    }

    pub fn health(&self) -> Arc<HealthTracker> {
        Arc::clone(&self.context.health)
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.context.metrics
    }

    /// Messages currently buffered between readers and writers
    pub fn buffered(&self) -> usize {
        self.context.buffer.len()
    }

    /// Spawn every reader and writer task onto `tasks`
    pub fn spawn(&self, tasks: &mut JoinSet<()>) {
        let config = &self.context.config;
        info!(
            queue = %config.id,
            source = %config.queue,
            topic = %config.topic,
            readers = config.readers,
            writers = config.writers,
            buffer = config.buffer,
            "Starting pipeline"
        );

        for id in 0..config.readers {
            tasks.spawn(Reader::new(id, Arc::clone(&self.context)).run());
        }
        for id in 0..config.writers {
            tasks.spawn(Writer::new(id, Arc::clone(&self.context)).run());
        }
    }
}

/// Supervisor of every configured pipeline
#[derive(Debug)]
pub struct Relay {
    pipelines: Vec<Pipeline>,
    metrics: RelayMetrics,
    shutdown: CancellationToken,
}

impl Relay {
    /// Build one pipeline per config; any client creation failure aborts startup
    pub async fn build(
        configs: &[PipelineConfig],
        factory: &dyn ClientFactory,
        metrics: RelayMetrics,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let mut pipelines = Vec::with_capacity(configs.len());

        for config in configs {
            let pipeline = Pipeline::build(config.clone(), factory, &metrics, shutdown.clone()).await?;
            pipelines.push(pipeline);
        }

        Ok(Self {
            pipelines,
            metrics,
            shutdown,
        })
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn pipeline(&self, id: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.id() == id)
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Token that stops every pipeline when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Health probe over all pipelines, in configuration order
    pub fn health_probe(&self, ttl: Duration) -> AggregateHealthProbe {
        AggregateHealthProbe::new(
            self.pipelines
                .iter()
                .map(|p| (p.id().to_string(), p.health()))
                .collect(),
            ttl,
        )
    }

    /// Spawn all reader and writer tasks
    pub fn start(&self) -> RelayHandle {
        let mut tasks = JoinSet::new();
        for pipeline in &self.pipelines {
            pipeline.spawn(&mut tasks);
        }

        info!(pipelines = self.pipelines.len(), tasks = tasks.len(), "Relay started");

        RelayHandle {
            tasks,
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Running relay tasks
#[derive(Debug)]
pub struct RelayHandle {
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
}

impl RelayHandle {
    /// Signal every task to stop at its next suspension point
    ///
    /// Buffered and in-progress messages are abandoned, not drained.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait for every task to exit
    pub async fn wait(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Relay task ended abnormally");
            }
        }
        info!("Relay stopped");
    }

    pub async fn shutdown_and_wait(self) {
        self.shutdown();
        self.wait().await;
    }
}

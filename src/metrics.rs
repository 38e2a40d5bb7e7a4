//! Relay metrics collection
//!
//! One Prometheus [`Registry`] per relay, with every instrument partitioned by
//! the `queue` label. Readers and writers get a [`PipelineMetrics`] with the
//! label already bound.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::config::DEFAULT_LATENCY_BUCKETS;
use crate::error::Result;

const QUEUE_LABEL: &str = "queue";

/// Relay metrics collector
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Arc<Registry>,
    buffer: IntGaugeVec,
    receive: IntCounterVec,
    receive_error: IntCounterVec,
    receive_empty: IntCounterVec,
    receive_messages: IntCounterVec,
    publish_error: IntCounterVec,
    delete_error: IntCounterVec,
    delivery: IntCounterVec,
    latency: HistogramVec,
}

impl RelayMetrics {
    /// Create and register every relay instrument
    pub fn new(namespace: &str, latency_buckets: Vec<f64>) -> Result<Self> {
        if latency_buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(prometheus::Error::Msg(
                "latency buckets must be in increasing order".to_string(),
            )
            .into());
        }

        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> Result<IntCounterVec> {
            let counter = IntCounterVec::new(Opts::new(name, help).namespace(namespace), &[QUEUE_LABEL])?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let receive = counter("receive_total", "How many queue receives called, partitioned by queue.")?;
        let receive_error = counter(
            "receive_error_total",
            "How many queue receives errored, partitioned by queue.",
        )?;
        let receive_empty = counter(
            "receive_empty_total",
            "How many queue receives returned no messages, partitioned by queue.",
        )?;
        let receive_messages = counter(
            "receive_messages_total",
            "How many queue messages received, partitioned by queue.",
        )?;
        let publish_error = counter(
            "publish_error_total",
            "How many topic publishes errored, partitioned by queue.",
        )?;
        let delete_error = counter(
            "delete_error_total",
            "How many queue deletes errored, partitioned by queue.",
        )?;
        let delivery = counter(
            "delivery_total",
            "How many deliveries fully processed, partitioned by queue.",
        )?;

        let buffer = IntGaugeVec::new(
            Opts::new("buffer", "How many messages are buffered with us, partitioned by queue.")
                .namespace(namespace),
            &[QUEUE_LABEL],
        )?;
        registry.register(Box::new(buffer.clone()))?;

        let latency = HistogramVec::new(
            HistogramOpts::new(
                "delivery_duration_seconds",
                "How long it took to fully process the delivery, partitioned by queue.",
            )
            .namespace(namespace)
            .buckets(latency_buckets),
            &[QUEUE_LABEL],
        )?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            buffer,
            receive,
            receive_error,
            receive_empty,
            receive_messages,
            publish_error,
            delete_error,
            delivery,
            latency,
        })
    }

    /// Instruments bound to one pipeline's `queue` label
    pub fn pipeline(&self, queue_id: &str) -> PipelineMetrics {
        let labels = [queue_id];
        PipelineMetrics {
            buffer: self.buffer.with_label_values(&labels),
            receive: self.receive.with_label_values(&labels),
            receive_error: self.receive_error.with_label_values(&labels),
            receive_empty: self.receive_empty.with_label_values(&labels),
            receive_messages: self.receive_messages.with_label_values(&labels),
            publish_error: self.publish_error.with_label_values(&labels),
            delete_error: self.delete_error.with_label_values(&labels),
            delivery: self.delivery.with_label_values(&labels),
            latency: self.latency.with_label_values(&labels),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get metrics as Prometheus text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()).into())
    }

    /// Content type of [`RelayMetrics::render`] output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

impl std::fmt::Debug for RelayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayMetrics").finish_non_exhaustive()
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new("queuerelay", DEFAULT_LATENCY_BUCKETS.to_vec())
            .expect("Failed to create default metrics")
    }
}

/// Metrics handle for one pipeline
#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    buffer: IntGauge,
    receive: IntCounter,
    receive_error: IntCounter,
    receive_empty: IntCounter,
    receive_messages: IntCounter,
    publish_error: IntCounter,
    delete_error: IntCounter,
    delivery: IntCounter,
    latency: Histogram,
}

impl PipelineMetrics {
    pub fn inc_receive(&self) {
        self.receive.inc();
    }

    pub fn inc_receive_error(&self) {
        self.receive_error.inc();
    }

    pub fn inc_receive_empty(&self) {
        self.receive_empty.inc();
    }

    pub fn add_receive_messages(&self, count: usize) {
        self.receive_messages.inc_by(count as u64);
    }

    pub fn inc_publish_error(&self) {
        self.publish_error.inc();
    }

    pub fn inc_delete_error(&self) {
        self.delete_error.inc();
    }

    /// Record a full delivery and its end-to-end latency
    pub fn record_delivery(&self, latency: std::time::Duration) {
        self.delivery.inc();
        self.latency.observe(latency.as_secs_f64());
    }

    pub fn set_buffer(&self, occupancy: usize) {
        self.buffer.set(occupancy as i64);
    }

    pub fn receive_count(&self) -> u64 {
        self.receive.get()
    }

    pub fn receive_error_count(&self) -> u64 {
        self.receive_error.get()
    }

    pub fn receive_empty_count(&self) -> u64 {
        self.receive_empty.get()
    }

    pub fn receive_messages_count(&self) -> u64 {
        self.receive_messages.get()
    }

    pub fn publish_error_count(&self) -> u64 {
        self.publish_error.get()
    }

    pub fn delete_error_count(&self) -> u64 {
        self.delete_error.get()
    }

    pub fn delivery_count(&self) -> u64 {
        self.delivery.get()
    }

    pub fn buffer_occupancy(&self) -> i64 {
        self.buffer.get()
    }

    pub fn latency_sample_count(&self) -> u64 {
        self.latency.get_sample_count()
    }
}

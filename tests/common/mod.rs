#![allow(dead_code)]

pub mod recording;

pub use recording::*;

use queue_relay::config::PipelineConfig;
use queue_relay::messaging::{BackendClientFactory, MemoryBroker, MemoryQueue, MemoryTopic};
use queue_relay::metrics::RelayMetrics;
use queue_relay::pipeline::Relay;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory pipeline config with short cooldowns and no long-polling
pub fn fast_config(id: &str) -> PipelineConfig {
    let mut config = PipelineConfig::for_memory(id, format!("{id}_queue"), format!("{id}_topic"));
    config.readers = 1;
    config.writers = 1;
    config.buffer = 10;
    config.wait_time_seconds = 0;
    config.empty_receive_cooldown = Duration::from_millis(5);
    config.error_cooldown_read = Duration::from_millis(20);
    config.error_cooldown_write = Duration::from_millis(20);
    config.error_cooldown_delete = Duration::from_millis(20);
    config
}

/// A relay over the memory backend, with handles to its broker queues and topics
pub struct MemoryRelay {
    pub broker: MemoryBroker,
    pub relay: Relay,
}

impl MemoryRelay {
    pub async fn build(configs: &[PipelineConfig]) -> Self {
        let broker = MemoryBroker::new();
        let factory = BackendClientFactory::with_memory_broker(broker.clone());
        let relay = Relay::build(configs, &factory, RelayMetrics::default())
            .await
            .expect("memory relay should build");
        Self { broker, relay }
    }

    pub fn queue(&self, config: &PipelineConfig) -> Arc<MemoryQueue> {
        self.broker.queue(&config.queue)
    }

    pub fn topic(&self, config: &PipelineConfig) -> Arc<MemoryTopic> {
        self.broker.topic(&config.topic)
    }
}

/// Fill a memory queue with `count` numbered messages
pub fn fill(queue: &MemoryQueue, count: usize) {
    for i in 0..count {
        queue.send(format!("message-{i}"), Default::default());
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

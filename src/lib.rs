#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, pgmq in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Queue Relay
//!
//! Durable relay from pull-based message queues to publish-based topics.
//!
//! ## Overview
//!
//! Every configured source queue gets an independent forwarding pipeline: a pool
//! of readers pulls batches into a bounded buffer, and a pool of writers drains
//! it, publishing each message to the destination topic and deleting it from the
//! source only after the publish succeeded. Failures are retried after fixed
//! cooldowns and surface through per-pipeline health and Prometheus metrics.
//!
//! ## Module Organization
//!
//! - [`config`] - Environment settings, YAML queue list, default resolution
//! - [`messaging`] - Message model, queue/topic client traits, pgmq and in-memory backends
//! - [`pipeline`] - Buffer, readers, writers and the relay supervisor
//! - [`health`] - Per-pipeline health trackers and the cached aggregate probe
//! - [`metrics`] - Prometheus instruments partitioned by queue
//! - [`web`] - Health and metrics HTTP endpoints
//! - [`logging`] - Structured logging bootstrap
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use queue_relay::config::PipelineConfig;
//! use queue_relay::messaging::{BackendClientFactory, MemoryBroker};
//! use queue_relay::metrics::RelayMetrics;
//! use queue_relay::pipeline::Relay;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = MemoryBroker::new();
//! let factory = BackendClientFactory::with_memory_broker(broker.clone());
//! let config = PipelineConfig::for_memory("orders", "orders_queue", "orders_topic");
//!
//! let relay = Relay::build(&[config], &factory, RelayMetrics::default()).await?;
//! let handle = relay.start();
//!
//! broker.queue("orders_queue").send("hello", Default::default());
//!
//! handle.shutdown_and_wait().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod pipeline;
pub mod web;

pub use config::{ConfigManager, ConfigurationError, PipelineConfig, RelaySettings};
pub use error::{RelayError, Result};
pub use health::{AggregateHealthProbe, HealthState, HealthTracker};
pub use messaging::{ClientFactory, MessagingError, QueueClient, TopicClient};
pub use metrics::{PipelineMetrics, RelayMetrics};
pub use pipeline::{DeliveryOutcome, Pipeline, Relay, RelayHandle};

//! # Relay Configuration
//!
//! Two layers of configuration feed the relay:
//!
//! - **Settings** ([`RelaySettings`]): process-wide values read from environment
//!   variables (endpoints, metrics, and the defaults every queue inherits).
//! - **Queue list** ([`QueueDefinition`]): a YAML sequence naming each source
//!   queue and destination topic, optionally overriding any default.
//!
//! [`ConfigManager`] merges the two into one immutable [`PipelineConfig`] per queue.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use queue_relay::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//!
//! for pipeline in config.pipelines() {
//!     println!("{} -> {}", pipeline.queue, pipeline.topic);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Default cooldown applied after failures and empty receives
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Writers per reader when no writer count is configured
pub const WRITERS_PER_READER: usize = 15;

/// Buffer slots per reader when no buffer capacity is configured
pub const BUFFER_PER_READER: usize = 30;

/// Largest batch a single receive may request
pub const MAX_RECEIVE_BATCH: u8 = 10;

/// Longest long-poll wait a single receive may request
pub const MAX_WAIT_TIME_SECONDS: u8 = 20;

/// Default latency histogram buckets, in seconds
pub const DEFAULT_LATENCY_BUCKETS: [f64; 13] = [
    0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Which client implementation a pipeline talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Pgmq,
    Memory,
}

/// Fully resolved client backend for one pipeline
#[derive(Clone, PartialEq, Eq)]
pub enum ClientBackend {
    Pgmq { database_url: String },
    Memory,
}

impl fmt::Display for ClientBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pgmq { database_url } => write!(f, "pgmq({})", redact_url(database_url)),
            Self::Memory => write!(f, "memory"),
        }
    }
}

// Keeps credentials out of `{:?}` output.
impl fmt::Debug for ClientBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for ClientBackend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Strip credentials from a connection string before it reaches logs or errors
pub fn redact_url(database_url: &str) -> String {
    match (database_url.find("://"), database_url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &database_url[..scheme_end], &database_url[at + 1..])
        }
        _ => database_url.to_string(),
    }
}

/// Process-wide settings read from environment variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Path of the YAML queue list
    pub queues: String,

    pub health_addr: String,
    pub health_path: String,
    #[serde(with = "humantime_serde")]
    pub health_cache_ttl: Duration,

    pub metrics_addr: String,
    pub metrics_path: String,
    pub metrics_namespace: String,
    pub metrics_buckets_latency: Vec<f64>,

    pub backend: BackendKind,
    #[serde(skip_serializing)]
    pub database_url: Option<String>,

    pub readers: usize,
    /// Zero means `15 × readers`
    pub writers: usize,
    /// Zero means `30 × readers`
    pub buffer: usize,

    #[serde(with = "humantime_serde")]
    pub read_error_cooldown: Duration,
    #[serde(with = "humantime_serde")]
    pub write_error_cooldown: Duration,
    #[serde(with = "humantime_serde")]
    pub delete_error_cooldown: Duration,
    #[serde(with = "humantime_serde")]
    pub empty_receive_cooldown: Duration,

    pub max_number_of_messages: u8,
    pub wait_time_seconds: u8,
    #[serde(with = "humantime_serde")]
    pub visibility_timeout: Duration,

    pub copy_attributes: bool,
    pub copy_message_group_id: bool,
    pub debug: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            queues: "queues.yaml".to_string(),
            health_addr: ":8888".to_string(),
            health_path: "/health".to_string(),
            health_cache_ttl: Duration::from_secs(10),
            metrics_addr: ":3000".to_string(),
            metrics_path: "/metrics".to_string(),
            metrics_namespace: "queuerelay".to_string(),
            metrics_buckets_latency: DEFAULT_LATENCY_BUCKETS.to_vec(),
            backend: BackendKind::Pgmq,
            database_url: None,
            readers: 1,
            writers: 0,
            buffer: 0,
            read_error_cooldown: DEFAULT_COOLDOWN,
            write_error_cooldown: DEFAULT_COOLDOWN,
            delete_error_cooldown: DEFAULT_COOLDOWN,
            empty_receive_cooldown: DEFAULT_COOLDOWN,
            max_number_of_messages: MAX_RECEIVE_BATCH,
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            visibility_timeout: Duration::from_secs(30),
            copy_attributes: true,
            copy_message_group_id: true,
            debug: true,
        }
    }
}

/// One entry of the YAML queue list
///
/// Only `id`, `queue` and `topic` are required; every other field overrides the
/// matching [`RelaySettings`] default when present and non-zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub queue: String,
    #[serde(default)]
    pub topic: String,

    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default, skip_serializing)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub readers: Option<usize>,
    #[serde(default)]
    pub writers: Option<usize>,
    #[serde(default)]
    pub buffer: Option<usize>,

    #[serde(default, with = "humantime_serde")]
    pub error_cooldown_read: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub error_cooldown_write: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub error_cooldown_delete: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub empty_receive_cooldown: Option<Duration>,

    #[serde(default)]
    pub max_number_of_messages: Option<u8>,
    #[serde(default)]
    pub wait_time_seconds: Option<u8>,
    #[serde(default, with = "humantime_serde")]
    pub visibility_timeout: Option<Duration>,

    #[serde(default)]
    pub copy_attributes: Option<bool>,
    #[serde(default)]
    pub copy_message_group_id: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
}

impl QueueDefinition {
    pub fn new(id: impl Into<String>, queue: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
            topic: topic.into(),
            ..Self::default()
        }
    }
}

/// Immutable settings of one queue-to-topic pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Pipeline identifier, used as the metrics label and in health reports
    pub id: String,
    pub queue: String,
    pub topic: String,
    pub backend: ClientBackend,

    pub readers: usize,
    pub writers: usize,
    pub buffer: usize,

    #[serde(with = "humantime_serde")]
    pub error_cooldown_read: Duration,
    #[serde(with = "humantime_serde")]
    pub error_cooldown_write: Duration,
    #[serde(with = "humantime_serde")]
    pub error_cooldown_delete: Duration,
    #[serde(with = "humantime_serde")]
    pub empty_receive_cooldown: Duration,

    pub max_number_of_messages: u8,
    pub wait_time_seconds: u8,
    #[serde(with = "humantime_serde")]
    pub visibility_timeout: Duration,

    pub copy_attributes: bool,
    pub copy_message_group_id: bool,
    pub debug: bool,
}

impl PipelineConfig {
    /// Merge a queue definition over the settings defaults
    ///
    /// Zero counts and zero durations count as unset. Writers and buffer fall back
    /// to multiples of the reader count when neither level configures them.
    pub fn with_defaults(
        definition: &QueueDefinition,
        settings: &RelaySettings,
        backend: ClientBackend,
    ) -> Self {
        fn count(value: Option<usize>, default: usize) -> usize {
            value.filter(|v| *v > 0).unwrap_or(default)
        }
        fn cooldown(value: Option<Duration>, default: Duration) -> Duration {
            value.filter(|v| !v.is_zero()).unwrap_or(default)
        }

        let readers = count(definition.readers, settings.readers);
        let writers = match count(definition.writers, settings.writers) {
            0 => WRITERS_PER_READER * readers,
            writers => writers,
        };
        let buffer = match count(definition.buffer, settings.buffer) {
            0 => BUFFER_PER_READER * readers,
            buffer => buffer,
        };

        Self {
            id: definition.id.clone(),
            queue: definition.queue.clone(),
            topic: definition.topic.clone(),
            backend,
            readers,
            writers,
            buffer,
            error_cooldown_read: cooldown(definition.error_cooldown_read, settings.read_error_cooldown),
            error_cooldown_write: cooldown(
                definition.error_cooldown_write,
                settings.write_error_cooldown,
            ),
            error_cooldown_delete: cooldown(
                definition.error_cooldown_delete,
                settings.delete_error_cooldown,
            ),
            empty_receive_cooldown: cooldown(
                definition.empty_receive_cooldown,
                settings.empty_receive_cooldown,
            ),
            max_number_of_messages: definition
                .max_number_of_messages
                .unwrap_or(settings.max_number_of_messages),
            wait_time_seconds: definition
                .wait_time_seconds
                .unwrap_or(settings.wait_time_seconds),
            visibility_timeout: cooldown(definition.visibility_timeout, settings.visibility_timeout),
            copy_attributes: definition.copy_attributes.unwrap_or(settings.copy_attributes),
            copy_message_group_id: definition
                .copy_message_group_id
                .unwrap_or(settings.copy_message_group_id),
            debug: definition.debug.unwrap_or(settings.debug),
        }
    }

    /// In-memory pipeline with default settings, for local runs and tests
    pub fn for_memory(id: impl Into<String>, queue: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::with_defaults(
            &QueueDefinition::new(id, queue, topic),
            &RelaySettings::default(),
            ClientBackend::Memory,
        )
    }

    /// Long-poll wait as a duration
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(u64::from(self.wait_time_seconds))
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> ConfigResult<()> {
        let context = format!("queue definition '{}'", self.id);
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("id", "queue definition"));
        }
        if self.queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("queue", context));
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("topic", context));
        }
        if !(1..=MAX_RECEIVE_BATCH).contains(&self.max_number_of_messages) {
            return Err(ConfigurationError::invalid_value(
                "max_number_of_messages",
                self.max_number_of_messages.to_string(),
                format!("{context}: must be between 1 and {MAX_RECEIVE_BATCH}"),
            ));
        }
        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::invalid_value(
                "wait_time_seconds",
                self.wait_time_seconds.to_string(),
                format!("{context}: must be at most {MAX_WAIT_TIME_SECONDS}"),
            ));
        }
        if self.readers == 0 {
            return Err(ConfigurationError::invalid_value(
                "readers",
                "0",
                format!("{context}: at least one reader is required"),
            ));
        }
        if let ClientBackend::Pgmq { database_url } = &self.backend {
            if database_url.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field("database_url", context));
            }
        }
        Ok(())
    }
}

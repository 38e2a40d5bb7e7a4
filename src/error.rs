use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use thiserror::Error;

/// Crate-level error for relay startup and supervision.
///
/// Failures inside reader/writer loops never surface here: they are absorbed
/// into metrics and pipeline health. Only construction and wiring fail.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Server error on {addr}: {message}")]
    Server { addr: String, message: String },

    #[error("Pipeline error for queue {queue_id}: {message}")]
    Pipeline { queue_id: String, message: String },
}

impl RelayError {
    /// Create a server error
    pub fn server(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            addr: addr.into(),
            message: message.into(),
        }
    }

    /// Create a pipeline error
    pub fn pipeline(queue_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Pipeline {
            queue_id: queue_id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

//! # Forwarding Pipelines
//!
//! Each configured queue gets an independent pipeline:
//!
//! ```text
//! QueueClient -> Reader xN -> MessageBuffer -> Writer xM -> TopicClient
//!                                                   \-> QueueClient::delete
//! ```
//!
//! Every failure is handled inside the loop that hit it: counted, written to the
//! pipeline's health tracker, and retried after a fixed cooldown. Delivery is
//! at-least-once; a message whose delete fails is published again when the
//! source queue redelivers it.

pub mod buffer;
pub mod context;
pub mod reader;
pub mod supervisor;
pub mod writer;

pub use buffer::MessageBuffer;
pub use context::{DeliveryOutcome, PipelineContext};
pub use reader::Reader;
pub use supervisor::{Pipeline, Relay, RelayHandle};
pub use writer::Writer;

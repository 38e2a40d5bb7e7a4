//! # Pipeline Health
//!
//! Per-pipeline [`HealthTracker`]s written by readers and writers, and the
//! cached [`AggregateHealthProbe`] behind the health endpoint.

pub mod probe;
pub mod tracker;

pub use probe::{AggregateHealthProbe, HealthSnapshot, ProbeResult, DEFAULT_HEALTH_CACHE_TTL};
pub use tracker::{HealthState, HealthTracker};

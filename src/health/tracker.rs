//! Per-pipeline health tracking.
//!
//! Every reader and writer of a pipeline shares one [`HealthTracker`]. Failures
//! overwrite the status with the error; a full delivery clears it. Only the most
//! recent status is kept.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;

/// Last recorded status of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthState {
    /// Error text of the last failure, `None` when the last outcome succeeded
    pub error: Option<String>,
    /// When this status was set
    pub when: DateTime<Utc>,
}

impl HealthState {
    pub fn healthy() -> Self {
        Self {
            error: None,
            when: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::healthy()
    }
}

/// Latest-status-wins health holder for one pipeline
///
/// No liveness heartbeat: a pipeline that stalls without failing keeps
/// reporting its last status.
#[derive(Debug, Default)]
pub struct HealthTracker {
    state: RwLock<HealthState>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the status and its timestamp in one step
    pub fn set_status(&self, error: Option<String>) {
        let next = HealthState {
            error,
            when: Utc::now(),
        };
        *self.state.write() = next;
    }

    pub fn record_error(&self, error: &impl fmt::Display) {
        self.set_status(Some(error.to_string()));
    }

    pub fn clear(&self) {
        self.set_status(None);
    }

    /// Consistent snapshot of the current status
    pub fn status(&self) -> HealthState {
        self.state.read().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().is_healthy()
    }
}

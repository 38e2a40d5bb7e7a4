//! Cached aggregate health probe.
//!
//! Scans pipeline trackers in configuration order and reports the first
//! unhealthy one. The scan result is cached for a fixed window so repeated
//! external health checks cost one lock acquisition each.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::tracker::{HealthState, HealthTracker};

/// Default cache window for probe results
pub const DEFAULT_HEALTH_CACHE_TTL: Duration = Duration::from_secs(10);

/// Result of one aggregate scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// Id of the first unhealthy pipeline, `None` when all are healthy
    pub queue_id: Option<String>,
    pub state: HealthState,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.state.is_healthy()
    }
}

/// A snapshot plus whether it was served from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub snapshot: HealthSnapshot,
    pub cached: bool,
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        self.snapshot.is_healthy()
    }

    /// Plain-text report, one line
    pub fn report(&self) -> String {
        match &self.snapshot.state.error {
            None => format!("200 server ok (cached:{})\n", self.cached),
            Some(error) => format!(
                "500 server failing: queue:{} error:{} when:{} (cached:{})\n",
                self.snapshot.queue_id.as_deref().unwrap_or_default(),
                error,
                self.snapshot.state.when.to_rfc3339(),
                self.cached
            ),
        }
    }
}

#[derive(Debug)]
struct CachedSnapshot {
    computed_at: Instant,
    snapshot: HealthSnapshot,
}

/// First-bad-pipeline-wins health probe over every pipeline tracker
#[derive(Debug)]
pub struct AggregateHealthProbe {
    trackers: Vec<(String, Arc<HealthTracker>)>,
    ttl: Duration,
    cache: Mutex<Option<CachedSnapshot>>,
}

impl AggregateHealthProbe {
    pub fn new(trackers: Vec<(String, Arc<HealthTracker>)>, ttl: Duration) -> Self {
        Self {
            trackers,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached snapshot, recomputed at most once per TTL window
    pub fn probe(&self) -> ProbeResult {
        let mut cache = self.cache.lock();

        if let Some(cached) = cache.as_ref() {
            if cached.computed_at.elapsed() < self.ttl {
                return ProbeResult {
                    snapshot: cached.snapshot.clone(),
                    cached: true,
                };
            }
        }

        let snapshot = self.scan();
        *cache = Some(CachedSnapshot {
            computed_at: Instant::now(),
            snapshot: snapshot.clone(),
        });

        ProbeResult {
            snapshot,
            cached: false,
        }
    }

    /// Uncached scan of all trackers
    pub fn scan(&self) -> HealthSnapshot {
        self.trackers
            .iter()
            .find_map(|(queue_id, tracker)| {
                let state = tracker.status();
                (!state.is_healthy()).then(|| HealthSnapshot {
                    queue_id: Some(queue_id.clone()),
                    state,
                })
            })
            .unwrap_or_else(|| HealthSnapshot {
                queue_id: None,
                state: HealthState::healthy(),
            })
    }
}

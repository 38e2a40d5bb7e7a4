//! # Route Definitions

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::health::AggregateHealthProbe;
use crate::metrics::RelayMetrics;
use crate::web::handlers;

/// Health route at `path`
pub fn health_routes(path: &str, probe: Arc<AggregateHealthProbe>) -> Router {
    Router::new()
        .route(path, get(handlers::health_check))
        .with_state(probe)
}

/// Metrics route at `path`
pub fn metrics_routes(path: &str, metrics: RelayMetrics) -> Router {
    Router::new()
        .route(path, get(handlers::prometheus_metrics))
        .with_state(metrics)
}

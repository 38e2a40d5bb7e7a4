//! # Health and Metrics Handlers

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, error};

use crate::health::AggregateHealthProbe;
use crate::metrics::RelayMetrics;

/// Aggregate health check: GET {HEALTH_PATH}
///
/// 200 when no pipeline reports an error, 500 naming the first failing
/// pipeline otherwise. Results are cached for the probe's TTL.
pub async fn health_check(State(probe): State<Arc<AggregateHealthProbe>>) -> Response {
    let result = probe.probe();
    let status = if result.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    debug!(
        healthy = result.is_healthy(),
        cached = result.cached,
        queue = ?result.snapshot.queue_id,
        "Health probe served"
    );

    (status, result.report()).into_response()
}

/// Prometheus metrics endpoint: GET {METRICS_PATH}
pub async fn prometheus_metrics(State(metrics): State<RelayMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics.content_type())], body).into_response(),
        Err(e) => {
            error!("Failed to export Prometheus metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to export metrics: {e}\n"),
            )
                .into_response()
        }
    }
}

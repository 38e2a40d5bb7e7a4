//! # Endpoint Servers
//!
//! Binds the health and metrics routers to their configured addresses and runs
//! them until the relay's shutdown token is cancelled. When both endpoints share
//! an address they are served by one listener.

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RelaySettings;
use crate::error::{RelayError, Result};
use crate::health::AggregateHealthProbe;
use crate::metrics::RelayMetrics;
use crate::web::routes::{health_routes, metrics_routes};

/// Endpoint addresses and paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub health_addr: String,
    pub health_path: String,
    pub metrics_addr: String,
    pub metrics_path: String,
}

impl From<&RelaySettings> for EndpointConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            health_addr: settings.health_addr.clone(),
            health_path: settings.health_path.clone(),
            metrics_addr: settings.metrics_addr.clone(),
            metrics_path: settings.metrics_path.clone(),
        }
    }
}

/// A running endpoint server
#[derive(Debug)]
pub struct ServerHandle {
    pub name: &'static str,
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// `:port` listens on every interface
pub fn bind_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Bind a listener, mapping failures to a startup error
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let bind_address = bind_address(addr);
    TcpListener::bind(&bind_address)
        .await
        .map_err(|e| RelayError::server(&bind_address, format!("Failed to bind: {e}")))
}

/// Serve `router` on `listener` until `shutdown` is cancelled
pub fn spawn_server(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<ServerHandle> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| RelayError::server(name, e.to_string()))?;

    info!(server = name, addr = %local_addr, "Starting endpoint server");

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        match result {
            Ok(()) => info!(server = name, addr = %local_addr, "Endpoint server stopped"),
            Err(e) => error!(server = name, addr = %local_addr, error = %e, "Endpoint server error"),
        }
    });

    Ok(ServerHandle {
        name,
        local_addr,
        handle,
    })
}

/// Bind and start the health and metrics endpoints
///
/// Binding happens before anything is spawned, so an unavailable address is a
/// startup error. So is a path shared by both endpoints on one listener.
pub async fn start_endpoints(
    config: &EndpointConfig,
    probe: Arc<AggregateHealthProbe>,
    metrics: RelayMetrics,
    shutdown: CancellationToken,
) -> Result<Vec<ServerHandle>> {
    let health = health_routes(&config.health_path, probe);
    let metrics = metrics_routes(&config.metrics_path, metrics);

    if bind_address(&config.health_addr) == bind_address(&config.metrics_addr) {
        if config.health_path == config.metrics_path {
            return Err(RelayError::server(
                bind_address(&config.health_addr),
                format!(
                    "health and metrics share path {} on one listener",
                    config.health_path
                ),
            ));
        }
        let listener = bind(&config.health_addr).await?;
        let server = spawn_server("health+metrics", listener, health.merge(metrics), shutdown)?;
        return Ok(vec![server]);
    }

    let health_listener = bind(&config.health_addr).await?;
    let metrics_listener = bind(&config.metrics_addr).await?;

    Ok(vec![
        spawn_server("health", health_listener, health, shutdown.clone())?,
        spawn_server("metrics", metrics_listener, metrics, shutdown)?,
    ])
}

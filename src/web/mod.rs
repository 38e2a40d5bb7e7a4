//! # Web Endpoints
//!
//! axum routers and servers for the relay's two external endpoints: the cached
//! aggregate health check and the Prometheus metrics exposition.

pub mod handlers;
pub mod routes;
pub mod server;

pub use routes::{health_routes, metrics_routes};
pub use server::{bind, bind_address, spawn_server, start_endpoints, EndpointConfig, ServerHandle};

//! # Queue Relay
//!
//! Relays every configured source queue to its destination topic and serves the
//! health and metrics endpoints. Settings come from environment variables; the
//! queue list from the YAML file named by `QUEUES`.

use anyhow::Context;
use clap::Parser;
use queue_relay::config::ConfigManager;
use queue_relay::logging::init_structured_logging;
use queue_relay::messaging::BackendClientFactory;
use queue_relay::metrics::RelayMetrics;
use queue_relay::pipeline::Relay;
use queue_relay::web::{start_endpoints, EndpointConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "queue-relay")]
#[command(about = "Relay messages from pull-based queues to publish-based topics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Queue list file (overrides QUEUES)
    #[arg(short, long)]
    queues: Option<String>,

    /// Load and validate configuration, print the resolved pipelines, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_structured_logging();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "🚀 Starting queue relay"
    );

    let mut settings = ConfigManager::settings_from_env().context("reading settings")?;
    if let Some(queues) = cli.queues {
        settings.queues = queues;
    }
    let config = ConfigManager::load_with_settings(settings).context("loading queue list")?;
    let settings = config.settings();

    if cli.check_config {
        for pipeline in config.pipelines() {
            println!("{}", serde_json::to_string_pretty(pipeline)?);
        }
        return Ok(());
    }

    if config.pipelines().is_empty() {
        warn!(queues_file = %settings.queues, "No queues configured; serving endpoints only");
    }

    let metrics = RelayMetrics::new(&settings.metrics_namespace, settings.metrics_buckets_latency.clone())
        .context("registering metrics")?;
    let factory = BackendClientFactory::new();

    let relay = Relay::build(config.pipelines(), &factory, metrics.clone())
        .await
        .context("building pipelines")?;
    let probe = Arc::new(relay.health_probe(settings.health_cache_ttl));

    let servers = start_endpoints(
        &EndpointConfig::from(settings),
        probe,
        metrics,
        relay.shutdown_token(),
    )
    .await
    .context("starting endpoints")?;

    let handle = relay.start();

    shutdown_signal().await;
    info!("🛑 Shutdown requested; abandoning in-flight messages to source redelivery");

    handle.shutdown_and_wait().await;
    for server in servers {
        if let Err(e) = server.handle.await {
            warn!(server = server.name, error = %e, "Endpoint server task failed");
        }
    }

    info!("✅ Queue relay stopped");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! # Batch Send
//!
//! Load generator for the relay: fills a pgmq source queue with synthetic
//! messages from concurrent senders, in batches of ten, and reports the rate.

use anyhow::Context;
use clap::Parser;
use queue_relay::logging::init_structured_logging;
use queue_relay::messaging::{MessageAttribute, PgmqConnections, PgmqQueueClient, RelayEnvelope};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Messages per send call
const BATCH: usize = 10;

#[derive(Parser)]
#[command(name = "batch-send")]
#[command(about = "Send synthetic messages to a pgmq queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Target pgmq queue
    #[arg(short, long)]
    queue: String,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Total number of messages to send
    #[arg(short, long, default_value_t = 30)]
    count: usize,

    /// Number of concurrent senders
    #[arg(short, long, default_value_t = 30)]
    writers: usize,

    /// String attributes per message
    #[arg(short, long, default_value_t = 1)]
    attributes: usize,

    /// Create the queue if it doesn't exist
    #[arg(long)]
    create: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let writers = cli.writers.max(1);
    let client = PgmqConnections::default()
        .queue_client(&cli.database_url, &cli.queue, Duration::from_secs(30))
        .await
        .context("connecting to pgmq")?;

    if cli.create {
        client.create_queue().await.context("creating queue")?;
    }

    let batch = Arc::new(build_batch(cli.attributes));
    let client = Arc::new(client);
    let begin = Instant::now();

    let mut senders = JoinSet::new();
    for id in 0..writers {
        let share = cli.count / writers + usize::from(id < cli.count % writers);
        senders.spawn(send(id, Arc::clone(&client), Arc::clone(&batch), share));
    }

    let mut sent = 0;
    while let Some(joined) = senders.join_next().await {
        sent += joined.context("sender task panicked")??;
    }

    let elapsed = begin.elapsed();
    let rate = sent as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        queue = %cli.queue,
        sent,
        interval = ?elapsed,
        rate = %format!("{rate:.1}"),
        "messages/sec"
    );
    Ok(())
}

fn build_batch(attributes: usize) -> Vec<RelayEnvelope> {
    (0..BATCH)
        .map(|i| RelayEnvelope {
            body: format!("batch-send message {i}"),
            attributes: (0..attributes)
                .map(|j| (j.to_string(), MessageAttribute::string("String", j.to_string())))
                .collect(),
            group_id: None,
        })
        .collect()
}

async fn send(
    id: usize,
    client: Arc<PgmqQueueClient>,
    batch: Arc<Vec<RelayEnvelope>>,
    count: usize,
) -> anyhow::Result<usize> {
    let mut sent = 0;
    while sent < count {
        let size = BATCH.min(count - sent);
        let ids = client
            .send_batch(&batch[..size])
            .await
            .with_context(|| format!("sender {id}"))?;
        sent += ids.len();
        debug!(sender = id, sent, total = count, "Batch sent");
    }
    Ok(sent)
}

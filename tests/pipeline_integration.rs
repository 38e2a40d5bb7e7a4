//! End-to-end pipeline behavior over the in-memory backend.

mod common;

use common::*;
use queue_relay::metrics::RelayMetrics;
use queue_relay::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delivers_every_message_with_single_reader_and_writer() {
    let config = fast_config("orders");
    let env = MemoryRelay::build(&[config.clone()]).await;
    fill(&env.queue(&config), 100);

    let handle = env.relay.start();
    let pipeline = env.relay.pipeline("orders").unwrap();

    let drained = wait_until(Duration::from_secs(10), || {
        pipeline.metrics().delivery_count() == 100
    })
    .await;
    handle.shutdown_and_wait().await;

    assert!(drained, "delivered {}", pipeline.metrics().delivery_count());
    assert!(env.queue(&config).is_empty());
    assert_eq!(env.topic(&config).len(), 100);
    assert_eq!(pipeline.metrics().receive_messages_count(), 100);
    assert_eq!(pipeline.metrics().latency_sample_count(), 100);
    assert!(pipeline.health().is_healthy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn published_bodies_match_source_bodies() {
    let mut config = fast_config("mirror");
    config.readers = 2;
    config.writers = 4;
    let env = MemoryRelay::build(&[config.clone()]).await;
    fill(&env.queue(&config), 40);

    let handle = env.relay.start();
    let topic = env.topic(&config);
    assert!(wait_until(Duration::from_secs(10), || topic.len() == 40).await);
    handle.shutdown_and_wait().await;

    let mut bodies: Vec<String> = topic
        .published()
        .into_iter()
        .map(|p| p.request.body)
        .collect();
    bodies.sort();
    let mut expected: Vec<String> = (0..40).map(|i| format!("message-{i}")).collect();
    expected.sort();
    assert_eq!(bodies, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_receive_turns_pipeline_unhealthy() {
    let mut config = fast_config("broken");
    config.error_cooldown_read = Duration::from_millis(100);
    let env = MemoryRelay::build(&[config.clone()]).await;
    env.queue(&config).set_fail_receive(true);
    env.topic(&config).set_fail_publish(true);

    let probe = env.relay.health_probe(Duration::ZERO);
    let handle = env.relay.start();

    let unhealthy = wait_until(config.error_cooldown_read * 2, || !probe.probe().is_healthy()).await;
    handle.shutdown_and_wait().await;

    assert!(unhealthy);
    let pipeline = env.relay.pipeline("broken").unwrap();
    assert_eq!(pipeline.metrics().delivery_count(), 0);
    assert!(pipeline.metrics().receive_error_count() >= 1);
    assert!(probe.probe().report().contains("queue:broken"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_delete_never_counts_deliveries() {
    let mut config = fast_config("sticky");
    config.visibility_timeout = Duration::from_millis(100);
    config.error_cooldown_delete = Duration::from_millis(10);
    let env = MemoryRelay::build(&[config.clone()]).await;
    let queue = env.queue(&config);
    fill(&queue, 3);
    queue.set_fail_delete(true);

    let handle = env.relay.start();
    let pipeline = env.relay.pipeline("sticky").unwrap();

    let mut samples = Vec::new();
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        samples.push(pipeline.metrics().delete_error_count());
    }
    handle.shutdown_and_wait().await;

    assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
    assert!(samples.last().copied().unwrap_or_default() > 3, "{samples:?}");
    assert_eq!(pipeline.metrics().delivery_count(), 0);
    assert!(!pipeline.health().is_healthy());
    // Undeleted messages remain owned by the source queue
    assert_eq!(queue.len(), 3);
    // and come back after the visibility timeout, so they are published again
    assert!(env.topic(&config).len() > 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redelivered_messages_are_delivered_exactly_once_after_recovery() {
    let mut config = fast_config("recover");
    config.writers = 2;
    config.visibility_timeout = Duration::from_millis(100);
    config.error_cooldown_delete = Duration::from_millis(10);
    let env = MemoryRelay::build(&[config.clone()]).await;
    let queue = env.queue(&config);
    let topic = env.topic(&config);
    fill(&queue, 5);
    queue.set_fail_delete(true);

    let handle = env.relay.start();
    let pipeline = env.relay.pipeline("recover").unwrap();

    assert!(wait_until(Duration::from_secs(5), || pipeline.metrics().delete_error_count() >= 5).await);
    queue.set_fail_delete(false);

    assert!(wait_until(Duration::from_secs(10), || queue.is_empty()).await);
    let metrics = pipeline.metrics();
    let settled = wait_until(Duration::from_secs(5), || {
        topic.publish_calls() == metrics.delivery_count() + metrics.delete_error_count()
    })
    .await;
    handle.shutdown_and_wait().await;

    assert!(settled);
    // A stale handle can only fail its delete; each message is deleted once
    assert_eq!(metrics.delivery_count(), 5);
    assert!(topic.len() > 5);
    assert_eq!(metrics.publish_error_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn buffer_never_exceeds_capacity() {
    let mut config = fast_config("slow");
    config.buffer = 5;
    config.error_cooldown_write = Duration::from_secs(10);
    let env = MemoryRelay::build(&[config.clone()]).await;
    fill(&env.queue(&config), 50);
    env.topic(&config).set_fail_publish(true);

    let handle = env.relay.start();
    let pipeline = env.relay.pipeline("slow").unwrap();

    let mut peak = 0;
    for _ in 0..40 {
        peak = peak.max(pipeline.buffered());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let occupancy = pipeline.metrics().buffer_occupancy();
    let received = pipeline.metrics().receive_messages_count();
    handle.shutdown_and_wait().await;

    assert_eq!(peak, 5);
    assert!((0..=5).contains(&occupancy), "occupancy {occupancy}");
    // The reader is parked on a full buffer, holding the rest of its first batch
    assert_eq!(received, 10);
    assert_eq!(pipeline.metrics().publish_error_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_always_follows_a_successful_publish() {
    let journal = Journal::default();
    let mut config = fast_config("ordered");
    config.writers = 3;
    let queue = Arc::new(ScriptedQueue::new(30, journal.clone()));
    let topic = Arc::new(JournalTopic::rejecting(journal.clone(), |body| body.ends_with('7')));
    let metrics = RelayMetrics::default();
    let shutdown = CancellationToken::new();

    let pipeline = Pipeline::new(config, queue, topic, metrics.pipeline("ordered"), shutdown.clone());
    let mut tasks = JoinSet::new();
    pipeline.spawn(&mut tasks);

    assert!(wait_until(Duration::from_secs(5), || pipeline.metrics().delivery_count() == 27).await);
    shutdown.cancel();
    while tasks.join_next().await.is_some() {}

    let mut published_at = HashMap::new();
    let mut deleted_at = HashMap::new();
    for (position, call) in journal.calls().into_iter().enumerate() {
        match call {
            Call::Publish { body } => {
                published_at.insert(body.trim_start_matches("body-").to_string(), position);
            }
            Call::Delete { receipt_handle } => {
                let key = receipt_handle.trim_start_matches("handle-").to_string();
                assert!(deleted_at.insert(key, position).is_none(), "deleted twice");
            }
        }
    }

    assert_eq!(deleted_at.len(), 27);
    for (key, deleted) in &deleted_at {
        let published = published_at.get(key).expect("deleted without publish");
        assert!(published < deleted);
    }
    for rejected in ["7", "17", "27"] {
        assert!(!deleted_at.contains_key(rejected));
    }
    assert_eq!(pipeline.metrics().publish_error_count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_stops_all_tasks_with_messages_buffered() {
    let mut config = fast_config("stop");
    config.readers = 3;
    config.writers = 2;
    config.error_cooldown_write = Duration::from_secs(60);
    let env = MemoryRelay::build(&[config.clone()]).await;
    fill(&env.queue(&config), 200);
    env.topic(&config).set_fail_publish(true);

    let handle = env.relay.start();
    let pipeline = env.relay.pipeline("stop").unwrap();
    assert!(wait_until(Duration::from_secs(5), || pipeline.buffered() == config.buffer).await);

    let stopped = tokio::time::timeout(Duration::from_secs(2), handle.shutdown_and_wait()).await;
    assert!(stopped.is_ok(), "relay tasks did not stop");
    assert_eq!(pipeline.metrics().delivery_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pipelines_fail_independently() {
    let healthy = fast_config("healthy");
    let broken = fast_config("broken");
    let env = MemoryRelay::build(&[healthy.clone(), broken.clone()]).await;
    fill(&env.queue(&healthy), 20);
    fill(&env.queue(&broken), 20);
    env.topic(&broken).set_fail_publish(true);

    let handle = env.relay.start();
    let good = env.relay.pipeline("healthy").unwrap();
    let bad = env.relay.pipeline("broken").unwrap();

    assert!(wait_until(Duration::from_secs(5), || good.metrics().delivery_count() == 20).await);
    assert!(wait_until(Duration::from_secs(5), || bad.metrics().publish_error_count() > 0).await);
    handle.shutdown_and_wait().await;

    assert!(good.health().is_healthy());
    assert!(!bad.health().is_healthy());
    assert_eq!(bad.metrics().delivery_count(), 0);

    let probe = env.relay.health_probe(Duration::ZERO).probe();
    assert!(!probe.is_healthy());
    assert_eq!(probe.snapshot.queue_id.as_deref(), Some("broken"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_receives_are_retried_after_the_read_cooldown() {
    let mut config = fast_config("throttled");
    config.error_cooldown_read = Duration::from_millis(50);
    let env = MemoryRelay::build(&[config.clone()]).await;
    let queue = env.queue(&config);
    queue.set_fail_receive(true);

    let handle = env.relay.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let calls = queue.receive_calls();
    handle.shutdown_and_wait().await;

    // One attempt at start, then at most one per cooldown
    assert!((2..=7).contains(&calls), "receive calls {calls}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_deletes_are_followed_by_the_delete_cooldown() {
    let mut config = fast_config("slow_delete");
    config.error_cooldown_delete = Duration::from_millis(50);
    let env = MemoryRelay::build(&[config.clone()]).await;
    let queue = env.queue(&config);
    fill(&queue, 50);
    queue.set_fail_delete(true);

    let handle = env.relay.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let deletes = queue.delete_calls();
    let publishes = env.topic(&config).publish_calls();
    handle.shutdown_and_wait().await;

    assert!((2..=7).contains(&deletes), "delete calls {deletes}");
    assert!(publishes <= deletes + 1, "publish calls {publishes}");
    assert_eq!(env.relay.pipeline("slow_delete").unwrap().metrics().delivery_count(), 0);
}

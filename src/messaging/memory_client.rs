//! # In-Memory Queue and Topic Backend
//!
//! Process-local implementations of [`QueueClient`] and [`TopicClient`] used for
//! local runs and tests. The queue reproduces the visibility-timeout contract of
//! a real pull queue: received messages stay hidden until deleted or until the
//! timeout expires, after which they are delivered again.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::messaging::client::{QueueClient, TopicClient};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::message::{MessageAttributes, PublishReceipt, PublishRequest, QueueMessage};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Registry of named in-memory queues and topics
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<DashMap<String, Arc<MemoryQueue>>>,
    topics: Arc<DashMap<String, Arc<MemoryTopic>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a queue with the default visibility timeout
    pub fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryQueue::new(name, DEFAULT_VISIBILITY_TIMEOUT)))
            .clone()
    }

    /// Get or create a queue, applying the given visibility timeout
    pub fn queue_with_visibility(&self, name: &str, visibility_timeout: Duration) -> Arc<MemoryQueue> {
        let queue = self.queue(name);
        queue.set_visibility_timeout(visibility_timeout);
        queue
    }

    /// Get or create a topic
    pub fn topic(&self, name: &str) -> Arc<MemoryTopic> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryTopic::new(name)))
            .clone()
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: MessageAttributes,
    group_id: Option<String>,
}

#[derive(Debug)]
struct MemoryQueueState {
    ready: VecDeque<StoredMessage>,
    /// receipt handle -> (message, visible again at)
    in_flight: HashMap<String, (StoredMessage, Instant)>,
    visibility_timeout: Duration,
}

impl MemoryQueueState {
    /// Return expired in-flight messages to the front of the ready queue
    fn restore_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, (_, visible_at))| *visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some((message, _)) = self.in_flight.remove(&handle) {
                self.ready.push_front(message);
            }
        }
    }

    fn take(&mut self, max_messages: usize, now: Instant) -> Vec<QueueMessage> {
        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(stored) = self.ready.pop_front() else {
                break;
            };
            let receipt_handle = Uuid::new_v4().to_string();
            batch.push(QueueMessage {
                message_id: stored.message_id.clone(),
                body: stored.body.clone(),
                attributes: stored.attributes.clone(),
                receipt_handle: receipt_handle.clone(),
                group_id: stored.group_id.clone(),
            });
            self.in_flight
                .insert(receipt_handle, (stored, now + self.visibility_timeout));
        }
        batch
    }
}

/// In-memory pull queue with visibility timeout and fault injection
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    state: Mutex<MemoryQueueState>,
    arrivals: Notify,
    next_id: AtomicU64,
    receive_calls: AtomicU64,
    delete_calls: AtomicU64,
    fail_receive: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryQueueState {
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
                visibility_timeout,
            }),
            arrivals: Notify::new(),
            next_id: AtomicU64::new(1),
            receive_calls: AtomicU64::new(0),
            delete_calls: AtomicU64::new(0),
            fail_receive: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_visibility_timeout(&self, visibility_timeout: Duration) {
        self.state.lock().visibility_timeout = visibility_timeout;
    }

    /// Enqueue a message, returning its message id
    pub fn send(&self, body: impl Into<String>, attributes: MessageAttributes) -> String {
        self.send_with_group(body, attributes, None)
    }

    /// Enqueue a message carrying a group key
    pub fn send_with_group(
        &self,
        body: impl Into<String>,
        attributes: MessageAttributes,
        group_id: Option<String>,
    ) -> String {
        let message_id = format!("{}-{}", self.name, self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state.lock().ready.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            attributes,
            group_id,
        });
        self.arrivals.notify_waiters();
        message_id
    }

    /// Messages still owned by the queue, visible or in flight
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn visible_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    pub fn receive_calls(&self) -> u64 {
        self.receive_calls.load(Ordering::Relaxed)
    }

    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::Relaxed)
    }

    /// Make every receive fail until reset
    pub fn set_fail_receive(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::Relaxed);
    }

    /// Make every delete fail until reset
    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::Relaxed);
    }

    fn try_take(&self, max_messages: usize) -> Vec<QueueMessage> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.restore_expired(now);
        state.take(max_messages, now)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn receive(&self, max_messages: u8, wait: Duration) -> MessagingResult<Vec<QueueMessage>> {
        self.receive_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_receive.load(Ordering::Relaxed) {
            return Err(MessagingError::receive(&self.name, "injected receive failure"));
        }

        let max_messages = usize::from(max_messages.clamp(1, 10));
        let deadline = Instant::now() + wait;

        loop {
            // Register interest before checking so a concurrent send is not missed.
            let arrival = self.arrivals.notified();
            let batch = self.try_take(max_messages);
            if !batch.is_empty() {
                debug!(queue = %self.name, count = batch.len(), "memory queue delivered batch");
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            // Wake up for new arrivals, or periodically to pick up expired in-flight messages.
            let nap = (deadline - now).min(Duration::from_millis(50));
            let _ = tokio::time::timeout(nap, arrival).await;
        }
    }

    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()> {
        self.delete_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_delete.load(Ordering::Relaxed) {
            return Err(MessagingError::delete(
                &self.name,
                receipt_handle,
                "injected delete failure",
            ));
        }

        match self.state.lock().in_flight.remove(receipt_handle) {
            Some(_) => Ok(()),
            None => Err(MessagingError::delete(
                &self.name,
                receipt_handle,
                "receipt handle is not in flight",
            )),
        }
    }
}

/// A message accepted by a [`MemoryTopic`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub message_id: String,
    pub request: PublishRequest,
}

/// In-memory topic that records every publish
#[derive(Debug)]
pub struct MemoryTopic {
    name: String,
    published: Mutex<Vec<PublishedMessage>>,
    publish_calls: AtomicU64,
    fail_publish: AtomicBool,
}

impl MemoryTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: Mutex::new(Vec::new()),
            publish_calls: AtomicU64::new(0),
            fail_publish: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn publish_calls(&self) -> u64 {
        self.publish_calls.load(Ordering::Relaxed)
    }

    /// Make every publish fail until reset
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl TopicClient for MemoryTopic {
    async fn publish(&self, request: PublishRequest) -> MessagingResult<PublishReceipt> {
        self.publish_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_publish.load(Ordering::Relaxed) {
            return Err(MessagingError::publish(&self.name, "injected publish failure"));
        }

        let message_id = Uuid::new_v4().to_string();
        self.published.lock().push(PublishedMessage {
            message_id: message_id.clone(),
            request,
        });
        Ok(PublishReceipt { message_id })
    }
}

//! Queue and topic doubles that journal every call in order.

use async_trait::async_trait;
use parking_lot::Mutex;
use queue_relay::messaging::{
    MessagingError, MessagingResult, PublishReceipt, PublishRequest, QueueClient, QueueMessage,
    TopicClient,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish { body: String },
    Delete { receipt_handle: String },
}

/// Shared, ordered journal of client calls
#[derive(Debug, Default, Clone)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    pub fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

/// Queue that hands out a fixed set of messages once, then stays empty
#[derive(Debug)]
pub struct ScriptedQueue {
    pending: Mutex<VecDeque<QueueMessage>>,
    journal: Journal,
}

impl ScriptedQueue {
    pub fn new(count: usize, journal: Journal) -> Self {
        let pending = (0..count)
            .map(|i| QueueMessage {
                message_id: format!("id-{i}"),
                body: format!("body-{i}"),
                attributes: Default::default(),
                receipt_handle: format!("handle-{i}"),
                group_id: None,
            })
            .collect();
        Self {
            pending: Mutex::new(pending),
            journal,
        }
    }
}

#[async_trait]
impl QueueClient for ScriptedQueue {
    async fn receive(&self, max_messages: u8, _wait: Duration) -> MessagingResult<Vec<QueueMessage>> {
        let mut pending = self.pending.lock();
        let take = usize::from(max_messages).min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    async fn delete(&self, receipt_handle: &str) -> MessagingResult<()> {
        self.journal.push(Call::Delete {
            receipt_handle: receipt_handle.to_string(),
        });
        Ok(())
    }
}

/// Topic that records publishes and can reject bodies matching a predicate
#[derive(Debug)]
pub struct JournalTopic {
    journal: Journal,
    reject: fn(&str) -> bool,
}

impl JournalTopic {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            reject: |_| false,
        }
    }

    pub fn rejecting(journal: Journal, reject: fn(&str) -> bool) -> Self {
        Self { journal, reject }
    }
}

#[async_trait]
impl TopicClient for JournalTopic {
    async fn publish(&self, request: PublishRequest) -> MessagingResult<PublishReceipt> {
        if (self.reject)(&request.body) {
            return Err(MessagingError::publish(&request.topic, "rejected"));
        }
        self.journal.push(Call::Publish {
            body: request.body.clone(),
        });
        Ok(PublishReceipt {
            message_id: format!("pub-{}", request.body),
        })
    }
}

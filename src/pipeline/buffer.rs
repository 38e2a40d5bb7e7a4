//! Bounded per-pipeline message buffer.
//!
//! Readers push, writers pop. A full buffer suspends `push` until a writer makes
//! room; that suspension is the only backpressure between a pipeline's readers
//! and its writers. Each message is popped by exactly one writer.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::messaging::InFlightMessage;

/// Bounded multi-producer, multi-consumer FIFO of in-flight messages
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    sender: mpsc::Sender<InFlightMessage>,
    receiver: Arc<Mutex<mpsc::Receiver<InFlightMessage>>>,
}

impl MessageBuffer {
    /// Create a buffer holding at most `capacity` messages (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Push a message, waiting while the buffer is full
    pub async fn push(
        &self,
        message: InFlightMessage,
    ) -> Result<(), mpsc::error::SendError<InFlightMessage>> {
        self.sender.send(message).await
    }

    /// Pop the oldest message, waiting while the buffer is empty
    pub async fn pop(&self) -> Option<InFlightMessage> {
        self.receiver.lock().await.recv().await
    }

    /// Messages currently held
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::QueueMessage;
    use std::collections::HashMap;
    use tokio_test::{assert_pending, assert_ready, task};

    fn message(id: &str) -> InFlightMessage {
        InFlightMessage::new(QueueMessage {
            message_id: id.to_string(),
            body: format!("body-{id}"),
            attributes: HashMap::new(),
            receipt_handle: id.to_string(),
            group_id: None,
        })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let buffer = MessageBuffer::new(4);
        buffer.push(message("1")).await.unwrap();
        buffer.push(message("2")).await.unwrap();

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop().await.unwrap().message_id(), "1");
        assert_eq!(buffer.pop().await.unwrap().message_id(), "2");
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let buffer = MessageBuffer::new(2);
        buffer.push(message("1")).await.unwrap();
        buffer.push(message("2")).await.unwrap();
        assert_eq!(buffer.len(), buffer.capacity());

        let mut blocked = task::spawn(buffer.push(message("3")));
        assert_pending!(blocked.poll());
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.pop().await.unwrap().message_id(), "1");
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_pop_blocks_when_empty() {
        let buffer = MessageBuffer::new(1);
        let mut waiting = task::spawn(buffer.pop());
        assert_pending!(waiting.poll());

        buffer.push(message("1")).await.unwrap();
        assert!(waiting.is_woken());
        let popped = assert_ready!(waiting.poll());
        assert_eq!(popped.unwrap().message_id(), "1");
    }

    #[tokio::test]
    async fn test_each_message_popped_once() {
        let buffer = MessageBuffer::new(64);
        for i in 0..64 {
            buffer.push(message(&i.to_string())).await.unwrap();
        }

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    while !buffer.is_empty() {
                        if let Ok(Some(m)) =
                            tokio::time::timeout(std::time::Duration::from_millis(10), buffer.pop()).await
                        {
                            ids.push(m.message_id().to_string());
                        }
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        assert_eq!(all.len(), 64);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 64);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(MessageBuffer::new(0).capacity(), 1);
    }
}

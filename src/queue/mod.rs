//! Trigger-message queue boundary.
//!
//! The runtime consumes [`QueueMessage`]s from a [`QueueSubscriber`] and
//! settles each one exactly once: `ack` consumes it, `nack` requests
//! redelivery, and dropping the message un-settled models lease expiry (the
//! queue redelivers on its own schedule). [`ChannelQueue`] is the in-process
//! implementation used by embedders and tests.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Explicit settlement of a trigger message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Consume the message; it is never redelivered.
    Ack,
    /// Return the message for redelivery.
    Nack,
}

/// One inbound trigger message with its single-use settlement handle.
#[derive(Debug)]
pub struct QueueMessage {
    payload: Vec<u8>,
    settle: oneshot::Sender<Disposition>,
}

impl QueueMessage {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn ack(self) {
        let _ = self.settle.send(Disposition::Ack);
    }

    pub fn nack(self) {
        let _ = self.settle.send(Disposition::Nack);
    }
}

/// Source of trigger messages.
#[async_trait]
pub trait QueueSubscriber: Send + Sync {
    /// Wait for the next message; `None` when the subscription has closed.
    async fn receive(&self) -> Result<Option<QueueMessage>>;
}

/// In-process queue backed by an mpsc channel.
pub struct ChannelQueue {
    rx: tokio::sync::Mutex<mpsc::Receiver<QueueMessage>>,
}

/// Publishing side of a [`ChannelQueue`].
#[derive(Clone)]
pub struct QueuePublisher {
    tx: mpsc::Sender<QueueMessage>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, QueuePublisher) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
            QueuePublisher { tx },
        )
    }
}

#[async_trait]
impl QueueSubscriber for ChannelQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>> {
        Ok(self.rx.lock().await.recv().await)
    }
}

impl QueuePublisher {
    /// Publish a payload; the returned receiver resolves with the consumer's
    /// settlement, or errors if the message was dropped un-settled.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<oneshot::Receiver<Disposition>> {
        let (settle, settled) = oneshot::channel();
        self.tx
            .send(QueueMessage { payload, settle })
            .await
            .map_err(|_| anyhow::anyhow!("queue closed"))?;
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ack_reaches_publisher() {
        let (queue, publisher) = ChannelQueue::new(4);
        let settled = publisher.publish(b"m1".to_vec()).await.unwrap();

        let message = queue.receive().await.unwrap().unwrap();
        assert_eq!(message.payload(), b"m1");
        message.ack();

        assert_eq!(settled.await.unwrap(), Disposition::Ack);
    }

    #[tokio::test]
    async fn test_nack_reaches_publisher() {
        let (queue, publisher) = ChannelQueue::new(4);
        let settled = publisher.publish(b"m2".to_vec()).await.unwrap();

        queue.receive().await.unwrap().unwrap().nack();
        assert_eq!(settled.await.unwrap(), Disposition::Nack);
    }

    #[tokio::test]
    async fn test_dropped_message_models_lease_expiry() {
        let (queue, publisher) = ChannelQueue::new(4);
        let settled = publisher.publish(b"m3".to_vec()).await.unwrap();

        drop(queue.receive().await.unwrap().unwrap());
        assert!(settled.await.is_err());
    }

    #[tokio::test]
    async fn test_receive_returns_none_when_closed() {
        let (queue, publisher) = ChannelQueue::new(4);
        drop(publisher);
        assert!(queue.receive().await.unwrap().is_none());
    }
}

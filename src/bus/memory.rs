//! In-memory bus for single-process deployments and tests.
//!
//! Uses a tokio broadcast channel. Clones share the channel, so several hubs
//! in one process can stand in for several gateway processes.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

use super::{topic_matches, Bus, BusMessage, BusStream, Result};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<BusMessage>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of live pattern subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        // No subscribers is not an error: nobody is listening for this room
        let _ = self.sender.send(BusMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<BusStream> {
        let pattern = pattern.to_string();
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
            let matched = match item {
                Ok(msg) if topic_matches(&pattern, &msg.topic) => Some(msg),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    warn!(skipped = n, "In-memory bus subscriber lagged");
                    None
                }
            };
            futures::future::ready(matched)
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_subscription_filters_topics() {
        let bus = MemoryBus::new();
        let mut stream = bus.psubscribe("ws:*").await.unwrap();

        bus.publish("other:1", "ignored").await.unwrap();
        bus.publish("ws:room", "hello").await.unwrap();

        let msg = stream.next().await.unwrap();
        assert_eq!(msg.topic, "ws:room");
        assert_eq!(msg.payload, "hello");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = MemoryBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.publish("ws:room", "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let bus = MemoryBus::new();
        let other = bus.clone();
        let mut stream = other.psubscribe("ws:*").await.unwrap();

        bus.publish("ws:a", "1").await.unwrap();
        assert_eq!(stream.next().await.unwrap().payload, "1");
    }
}

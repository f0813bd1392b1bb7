//! Redis pub/sub bus.
//!
//! Publishes through a `ConnectionManager` (reconnects on its own) and opens
//! a dedicated pub/sub connection per pattern subscription.

use async_trait::async_trait;
use futures::StreamExt;
use ::redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{info, warn};

use super::{Bus, BusError, BusMessage, BusStream, Result};

pub struct RedisBus {
    client: Client,
    conn: ConnectionManager,
}

impl RedisBus {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        info!(url = %url, "Connected to Redis bus");

        Ok(Self { client, conn })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn
            .publish(topic, payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<BusStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        pubsub
            .psubscribe(pattern)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(pattern = %pattern, "Subscribed to Redis pattern");

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let topic = msg.get_channel_name().to_string();
            let decoded = match msg.get_payload::<String>() {
                Ok(payload) => Some(BusMessage { topic, payload }),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Dropping non-text Redis payload");
                    None
                }
            };
            futures::future::ready(decoded)
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration tests require Redis running
    // Run with: cargo test -- --ignored

    #[tokio::test]
    async fn test_malformed_url_is_a_redis_error() {
        let result = RedisBus::connect("not a redis url").await;
        assert!(matches!(result, Err(BusError::Redis(_))));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_publish_reaches_pattern_subscriber() {
        let bus = RedisBus::connect("redis://localhost:6379")
            .await
            .expect("Failed to connect to Redis");

        let mut stream = bus.psubscribe("ws:*").await.unwrap();
        bus.publish("ws:redis-test", r#"{"t":"LFG_CREATE","d":{}}"#)
            .await
            .unwrap();

        let msg = stream.next().await.unwrap();
        assert_eq!(msg.topic, "ws:redis-test");
    }
}

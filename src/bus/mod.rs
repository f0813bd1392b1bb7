//! Cross-process publish/subscribe bus.
//!
//! This module contains:
//! - `Bus` trait: publish to a topic, pattern-subscribe to topics
//! - Topic naming for room broadcasts (`ws:<room>`)
//! - Implementations: in-memory (single process, tests) and Redis
//! - `BusBridge`: relays bus traffic into the local hub
//!
//! Delivery is best-effort and at-most-once. There is no outbox and no retry:
//! a publish that fails is logged and the event is dropped.

mod bridge;
mod memory;
#[cfg(feature = "redis")]
mod redis;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use bridge::BusBridge;
pub use memory::MemoryBus;
#[cfg(feature = "redis")]
pub use self::redis::RedisBus;

use crate::hub::RoomId;

/// Prefix of every room topic on the bus
pub const ROOM_TOPIC_PREFIX: &str = "ws:";

/// Pattern matching every room topic
pub const ROOM_TOPIC_PATTERN: &str = "ws:*";

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// One message received from a pattern subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

/// Stream of messages from a pattern subscription
pub type BusStream = BoxStream<'static, BusMessage>;

/// Publish/subscribe transport shared by every gateway process.
///
/// Implementations:
/// - `MemoryBus`: tokio broadcast channel, one process
/// - `RedisBus`: Redis PUBLISH / PSUBSCRIBE
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a payload to a topic. Fire-and-forget: no receiver count or
    /// acknowledgement is surfaced.
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    /// Subscribe to every topic matching a glob pattern (`prefix*`).
    ///
    /// The subscription is active when this returns.
    async fn psubscribe(&self, pattern: &str) -> Result<BusStream>;
}

/// Topic carrying broadcasts for a room
pub fn room_topic(room: &RoomId) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room}")
}

/// Room a topic belongs to, if it is a room topic
pub fn room_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(ROOM_TOPIC_PREFIX)
        .filter(|room| !room.is_empty())
}

/// Glob match supporting a single trailing `*`
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

//! Event broadcaster
//!
//! The one entry point producers use to push an event to a room. When a bus
//! is configured the event goes out to every gateway process (this one
//! included, via the relay); otherwise it is dispatched to local members
//! directly.

use serde_json::{json, Value};
use tracing::debug;

use crate::bus::BusBridge;
use crate::hub::{Hub, Principal, RoomId};
use crate::protocol::{EventType, ServerEvent};

#[derive(Clone)]
pub struct EventBroadcaster {
    hub: Hub,
    bridge: Option<BusBridge>,
}

impl EventBroadcaster {
    /// Single-process broadcaster
    pub fn local(hub: Hub) -> Self {
        Self { hub, bridge: None }
    }

    /// Broadcaster that fans out through the bus
    pub fn with_bridge(hub: Hub, bridge: BusBridge) -> Self {
        Self {
            hub,
            bridge: Some(bridge),
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.bridge.is_some()
    }

    /// Broadcast an event to every member of `room`. Best effort: failures
    /// are logged and the event is dropped.
    pub async fn publish(&self, room: &RoomId, kind: EventType, payload: Value) {
        let event = ServerEvent::new(kind, payload);
        match &self.bridge {
            Some(bridge) => bridge.publish(room, &event).await,
            None => {
                let delivered = self.hub.publish(room, &event);
                debug!(room = %room, event = %kind, delivered, "Published locally");
            }
        }
    }

    /// Broadcast to a text channel's room
    pub async fn to_channel(&self, channel_id: &str, kind: EventType, payload: Value) {
        self.publish(&RoomId::channel(channel_id), kind, payload).await;
    }

    /// Broadcast to a guild's room
    pub async fn to_guild(&self, guild_id: &str, kind: EventType, payload: Value) {
        self.publish(&RoomId::guild(guild_id), kind, payload).await;
    }

    /// Broadcast to a direct conversation's room
    pub async fn to_conversation(&self, conversation_id: &str, kind: EventType, payload: Value) {
        self.publish(&RoomId::conversation(conversation_id), kind, payload).await;
    }

    /// Ephemeral typing indicator. The sender's own connections are members
    /// of the room and receive it too.
    pub async fn typing_start(&self, principal: &Principal, channel_id: &str) {
        let payload = json!({
            "user_id": principal.as_str(),
            "channel_id": channel_id,
        });
        self.to_channel(channel_id, EventType::TypingStart, payload).await;
    }
}

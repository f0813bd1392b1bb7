//! Server event envelope

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A serialized server event, shared by every outbound queue it is enqueued on.
pub type Frame = Arc<str>;

/// Event types the gateway dispatches to clients
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    TypingStart,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    MemberJoin,
    MemberLeave,
    PresenceUpdate,
    VoiceStateUpdate,
    LfgCreate,
    LfgUpdate,
    LfgDelete,
}

impl EventType {
    #[cfg(test)]
    pub(crate) const ALL: [EventType; 14] = [
        EventType::MessageCreate,
        EventType::MessageUpdate,
        EventType::MessageDelete,
        EventType::TypingStart,
        EventType::ChannelCreate,
        EventType::ChannelUpdate,
        EventType::ChannelDelete,
        EventType::MemberJoin,
        EventType::MemberLeave,
        EventType::PresenceUpdate,
        EventType::VoiceStateUpdate,
        EventType::LfgCreate,
        EventType::LfgUpdate,
        EventType::LfgDelete,
    ];

    /// Wire tag, e.g. `MESSAGE_CREATE`
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::MessageCreate => "MESSAGE_CREATE",
            EventType::MessageUpdate => "MESSAGE_UPDATE",
            EventType::MessageDelete => "MESSAGE_DELETE",
            EventType::TypingStart => "TYPING_START",
            EventType::ChannelCreate => "CHANNEL_CREATE",
            EventType::ChannelUpdate => "CHANNEL_UPDATE",
            EventType::ChannelDelete => "CHANNEL_DELETE",
            EventType::MemberJoin => "MEMBER_JOIN",
            EventType::MemberLeave => "MEMBER_LEAVE",
            EventType::PresenceUpdate => "PRESENCE_UPDATE",
            EventType::VoiceStateUpdate => "VOICE_STATE_UPDATE",
            EventType::LfgCreate => "LFG_CREATE",
            EventType::LfgUpdate => "LFG_UPDATE",
            EventType::LfgDelete => "LFG_DELETE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server → client envelope
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    #[serde(rename = "t")]
    pub kind: EventType,

    /// Opaque payload; the hub never inspects it
    #[serde(rename = "d", default)]
    pub payload: Value,
}

impl ServerEvent {
    pub fn new(kind: EventType, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Serialize once into a frame that can be fanned out without copying
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }

    /// Decode a frame received from the bus
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

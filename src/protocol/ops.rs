//! Client operation envelope
//!
//! Decoding is deliberately tolerant: anything that is not a well-formed,
//! known operation with a non-empty target id decodes to `None` and is
//! dropped by the read pump without closing the connection.

use serde::{Deserialize, Serialize};

/// Payload of SUBSCRIBE, UNSUBSCRIBE and TYPING
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    #[serde(default)]
    pub channel_id: String,
}

/// Payload of SUBSCRIBE_GUILD
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRef {
    #[serde(default)]
    pub guild_id: String,
}

/// Client → hub operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientOp {
    Subscribe(ChannelRef),
    Unsubscribe(ChannelRef),
    Typing(ChannelRef),
    SubscribeGuild(GuildRef),
}

impl ClientOp {
    /// Decode a text frame, returning `None` for anything unusable
    pub fn decode(text: &str) -> Option<Self> {
        let op: ClientOp = serde_json::from_str(text).ok()?;
        op.has_target().then_some(op)
    }

    fn has_target(&self) -> bool {
        match self {
            ClientOp::Subscribe(c) | ClientOp::Unsubscribe(c) | ClientOp::Typing(c) => {
                !c.channel_id.is_empty()
            }
            ClientOp::SubscribeGuild(g) => !g.guild_id.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_subscribe() {
        let op = ClientOp::decode(r#"{"op":"SUBSCRIBE","d":{"channel_id":"42"}}"#);
        assert_eq!(
            op,
            Some(ClientOp::Subscribe(ChannelRef {
                channel_id: "42".to_string()
            }))
        );
    }

    #[test]
    fn test_decode_subscribe_guild() {
        let op = ClientOp::decode(r#"{"op":"SUBSCRIBE_GUILD","d":{"guild_id":"7"}}"#);
        assert_eq!(
            op,
            Some(ClientOp::SubscribeGuild(GuildRef {
                guild_id: "7".to_string()
            }))
        );
    }

    #[test]
    fn test_decode_typing_ignores_extra_fields() {
        let op = ClientOp::decode(r#"{"op":"TYPING","d":{"channel_id":"9","extra":true}}"#);
        assert!(matches!(op, Some(ClientOp::Typing(c)) if c.channel_id == "9"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(ClientOp::decode("not json"), None);
        assert_eq!(ClientOp::decode(r#"{"op":"SELF_DESTRUCT","d":{}}"#), None);
        assert_eq!(ClientOp::decode(r#"{"op":"SUBSCRIBE"}"#), None);
        assert_eq!(ClientOp::decode(r#"{"op":"SUBSCRIBE","d":"42"}"#), None);
    }

    #[test]
    fn test_decode_rejects_empty_target() {
        assert_eq!(ClientOp::decode(r#"{"op":"SUBSCRIBE","d":{"channel_id":""}}"#), None);
        assert_eq!(ClientOp::decode(r#"{"op":"UNSUBSCRIBE","d":{}}"#), None);
        assert_eq!(ClientOp::decode(r#"{"op":"SUBSCRIBE_GUILD","d":{"guild_id":""}}"#), None);
    }
}

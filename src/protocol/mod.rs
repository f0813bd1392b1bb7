//! Wire protocol for the realtime gateway
//!
//! Two distinct envelope shapes travel over a socket:
//! - server → client events: `{"t": <EVENT_TYPE>, "d": <payload>}`
//! - client → hub operations: `{"op": <OP>, "d": <payload>}`
//!
//! The bus carries the server event envelope verbatim; the room travels in
//! the topic name, never inside the payload.

mod events;
mod ops;

pub use events::{EventType, Frame, ServerEvent};
pub use ops::{ChannelRef, ClientOp, GuildRef};

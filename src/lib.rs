//! Aether Gateway
//!
//! Realtime fanout for chat-style applications: clients hold a websocket,
//! join rooms (channels, guilds, direct conversations), and receive every
//! event published to those rooms. Several gateway processes can run side
//! by side; a pub/sub bus relays each room broadcast to all of them and
//! each process delivers it to its own local members.
//!
//! # Features
//!
//! - **Single-writer hub**: one control loop owns registration and room
//!   membership; publishes read a shared snapshot of the index
//! - **Slow-consumer eviction**: bounded per-connection queues, a full
//!   queue disconnects that client without stalling anyone else
//! - **Cross-process relay**: Redis pattern subscription on `ws:*`, or an
//!   in-memory bus for single-process deployments and tests
//! - **Heartbeat**: ping/idle-timeout liveness per connection
//!
//! Delivery is at-most-once. There is no replay or persistence.
//!
//! # Modules
//!
//! - `protocol`: server event and client operation envelopes
//! - `hub`: connection registry, room index and control loop
//! - `bus`: `Bus` trait, memory/Redis buses and the relay bridge
//! - `api`: admission, websocket sessions, router and broadcaster
//! - `config`: environment configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use aether_gateway::{create_router, AppState, Hub};
//!
//! #[tokio::main]
//! async fn main() -> aether_gateway::GatewayResult<()> {
//!     let (hub, _control) = Hub::spawn();
//!     let app = create_router(Arc::new(AppState::new(hub, "secret")));
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bus;
pub mod config;
pub mod hub;
pub mod protocol;

// Re-export commonly used items at crate root
pub use api::{create_router, AppState, EventBroadcaster, JwtAuthenticator};
pub use bus::{Bus, BusBridge, BusError, MemoryBus};
pub use config::{GatewayConfig, SessionConfig};
pub use hub::{Connection, ConnectionId, Hub, HubError, Principal, RoomId};
pub use protocol::{ClientOp, EventType, ServerEvent};

#[cfg(feature = "redis")]
pub use bus::RedisBus;

/// Boxed error for the binary and top-level wiring
pub type GatewayResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Connection registry and room fanout
//!
//! ```text
//!  read pumps ──┐                      ┌── dispatch (local publish)
//!  write pumps ─┼─ Command ─► ControlLoop ── write lock ─► Registry ◄── read lock ──┤
//!  eviction ────┘   (mpsc)                                                          └── dispatch (bus relay)
//! ```
//!
//! Every mutation of the registry goes through a single control loop reached
//! by message passing. The loop takes the write lock only to apply a command,
//! so dispatch (from the local publish path and the bus relay, possibly at
//! the same time) only ever observes whole registrations and whole
//! deregistrations.
//!
//! Delivery is at-most-once: enqueue never blocks, and a connection whose
//! queue is full is closed and scheduled for deregistration instead of
//! holding up the rest of the room.

pub mod connection;
pub mod policy;
pub mod rooms;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{Frame, ServerEvent};

pub use connection::{
    Connection, ConnectionId, EnqueueError, OutboundReceiver, Principal,
    DEFAULT_OUTBOUND_CAPACITY,
};
pub use policy::{AllowAll, RoomPolicy};
pub use rooms::{RoomId, RoomIndex, CONVERSATION_ROOM_PREFIX, GUILD_ROOM_PREFIX};
pub use stats::HubSnapshot;

use stats::HubCounters;

/// Errors surfaced by hub requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("hub control loop has stopped")]
    Closed,
}

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A pump ended (transport error, client close, idle timeout)
    Closed,
    /// Outbound queue saturated
    SlowConsumer,
}

impl DisconnectReason {
    fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "closed",
            DisconnectReason::SlowConsumer => "slow_consumer",
        }
    }
}

enum Command {
    Register {
        conn: Arc<Connection>,
        done: oneshot::Sender<()>,
    },
    Deregister {
        id: ConnectionId,
        reason: DisconnectReason,
        done: Option<oneshot::Sender<bool>>,
    },
    Subscribe {
        id: ConnectionId,
        room: RoomId,
        done: oneshot::Sender<bool>,
    },
    Unsubscribe {
        id: ConnectionId,
        room: RoomId,
        done: oneshot::Sender<bool>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    rooms: RoomIndex,
}

/// Handle to a running hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<RwLock<Registry>>,
    counters: Arc<HubCounters>,
}

impl Hub {
    /// Start a hub and its control loop on the current runtime
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(RwLock::new(Registry::default()));
        let counters = Arc::new(HubCounters::default());

        let control = ControlLoop {
            commands: rx,
            registry: registry.clone(),
            counters: counters.clone(),
        };
        let handle = tokio::spawn(control.run());

        let hub = Self {
            commands,
            registry,
            counters,
        };
        (hub, handle)
    }

    /// Admit a connection. Its rooms start empty.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        self.request(|done| Command::Register { conn, done }).await
    }

    /// Remove a connection from the registry and every room, closing its queue.
    /// Returns false if it was not registered.
    pub async fn deregister(&self, id: ConnectionId) -> Result<bool, HubError> {
        self.request(|done| Command::Deregister {
            id,
            reason: DisconnectReason::Closed,
            done: Some(done),
        })
        .await
    }

    /// Queue a deregistration without waiting for it
    pub fn schedule_deregister(&self, id: ConnectionId, reason: DisconnectReason) {
        let _ = self.commands.send(Command::Deregister {
            id,
            reason,
            done: None,
        });
    }

    /// Add a registered connection to a room. Returns false if it was already
    /// a member or is not registered.
    pub async fn subscribe(&self, id: ConnectionId, room: RoomId) -> Result<bool, HubError> {
        self.request(|done| Command::Subscribe { id, room, done })
            .await
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub async fn unsubscribe(&self, id: ConnectionId, room: RoomId) -> Result<bool, HubError> {
        self.request(|done| Command::Unsubscribe { id, room, done })
            .await
    }

    /// Resolves once every command queued before this call has been applied
    pub async fn flush(&self) -> Result<(), HubError> {
        self.request(|done| Command::Flush { done }).await
    }

    /// Close every connection and stop the control loop
    pub async fn shutdown(&self) {
        if self.request(|done| Command::Shutdown { done }).await.is_err() {
            debug!("Hub already stopped");
        }
    }

    /// Local dispatch of an event to this process's members of `room`.
    /// Returns the number of connections the frame was enqueued on.
    pub fn publish(&self, room: &RoomId, event: &ServerEvent) -> usize {
        match event.to_frame() {
            Ok(frame) => self.dispatch(room.as_str(), frame),
            Err(e) => {
                warn!(room = %room, event = %event.kind, error = %e, "Failed to encode event");
                0
            }
        }
    }

    /// Enqueue a pre-serialized frame on every local member of `room`
    pub fn dispatch(&self, room: &str, frame: Frame) -> usize {
        let registry = self.registry.read();
        let Some(members) = registry.rooms.members(room) else {
            return 0;
        };

        let mut delivered = 0;
        for id in members {
            let Some(conn) = registry.connections.get(id) else {
                continue;
            };
            match conn.try_enqueue(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(EnqueueError::Full) => {
                    if conn.close() {
                        warn!(
                            conn_id = %id,
                            principal = %conn.principal(),
                            room,
                            queued = conn.queued(),
                            "Outbound queue full, evicting slow consumer"
                        );
                        self.counters.record_evicted();
                        self.schedule_deregister(*id, DisconnectReason::SlowConsumer);
                    }
                }
                Err(EnqueueError::Closed) => {}
            }
        }
        drop(registry);

        self.counters.record_enqueued(delivered);
        delivered
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let registry = self.registry.read();
        self.counters
            .snapshot(registry.connections.len(), registry.rooms.room_count())
    }

    pub fn connection_count(&self) -> usize {
        self.registry.read().connections.len()
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.registry.read().connections.contains_key(&id)
    }

    pub fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        self.registry.read().rooms.is_member(id, room)
    }

    /// Local members of a room
    pub fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.registry
            .read()
            .rooms
            .members(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> Vec<RoomId> {
        self.registry.read().rooms.rooms_of(id)
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.registry.read().rooms.room_ids()
    }

    /// Index agrees in both directions and only holds registered connections
    pub fn is_consistent(&self) -> bool {
        let registry = self.registry.read();
        registry.rooms.is_consistent()
            && registry.rooms.room_ids().iter().all(|room| {
                registry
                    .rooms
                    .members(room.as_str())
                    .is_some_and(|m| m.iter().all(|id| registry.connections.contains_key(id)))
            })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HubError> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(build(done))
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }
}

/// Sole writer of the registry
struct ControlLoop {
    commands: mpsc::UnboundedReceiver<Command>,
    registry: Arc<RwLock<Registry>>,
    counters: Arc<HubCounters>,
}

impl ControlLoop {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Register { conn, done } => {
                    self.register(conn);
                    let _ = done.send(());
                }
                Command::Deregister { id, reason, done } => {
                    let removed = self.deregister(id, reason);
                    if let Some(done) = done {
                        let _ = done.send(removed);
                    }
                }
                Command::Subscribe { id, room, done } => {
                    let _ = done.send(self.subscribe(id, room));
                }
                Command::Unsubscribe { id, room, done } => {
                    let removed = self.registry.write().rooms.unsubscribe(id, room.as_str());
                    if removed {
                        debug!(conn_id = %id, room = %room, "Unsubscribed");
                    }
                    let _ = done.send(removed);
                }
                Command::Flush { done } => {
                    let _ = done.send(());
                }
                Command::Shutdown { done } => {
                    self.close_all();
                    let _ = done.send(());
                    break;
                }
            }
        }

        // Every handle dropped or shutdown requested
        self.close_all();
        debug!("Hub control loop stopped");
    }

    fn register(&self, conn: Arc<Connection>) {
        let id = conn.id();
        info!(conn_id = %id, principal = %conn.principal(), "Connection registered");
        self.registry.write().connections.insert(id, conn);
        self.counters.record_registered();
    }

    fn deregister(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let mut registry = self.registry.write();
        let Some(conn) = registry.connections.remove(&id) else {
            return false;
        };
        let left = registry.rooms.remove_connection(id);
        drop(registry);

        conn.close();
        self.counters.record_deregistered();
        info!(
            conn_id = %id,
            principal = %conn.principal(),
            reason = reason.as_str(),
            rooms = left.len(),
            connected_secs = conn.connected_for().num_seconds(),
            "Connection deregistered"
        );
        true
    }

    fn subscribe(&self, id: ConnectionId, room: RoomId) -> bool {
        let mut registry = self.registry.write();
        if !registry.connections.contains_key(&id) {
            return false;
        }
        debug!(conn_id = %id, room = %room, "Subscribed");
        registry.rooms.subscribe(id, room)
    }

    fn close_all(&self) {
        let mut registry = self.registry.write();
        for conn in registry.connections.values() {
            conn.close();
        }
        let closed = registry.connections.len();
        registry.connections.clear();
        registry.rooms.clear();
        if closed > 0 {
            info!(connections = closed, "Hub closed all connections");
        }
    }
}

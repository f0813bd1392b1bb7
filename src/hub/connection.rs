//! Per-socket connection state
//!
//! A connection is an identity plus a bounded outbound queue. The queue is
//! "closed" by cancelling its token: the hub stops enqueueing and the write
//! pump flushes what is buffered and exits.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::Frame;

/// Default outbound queue depth per connection
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Unique id of one socket connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated identity bound to a connection for its lifetime
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a frame could not be enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// Queue saturated: slow consumer
    Full,
    /// Queue already closed
    Closed,
}

/// Receiving half of a connection's outbound queue, owned by the write pump
pub type OutboundReceiver = mpsc::Receiver<Frame>;

/// Registry-side view of one socket
pub struct Connection {
    id: ConnectionId,
    principal: Principal,
    outbound: mpsc::Sender<Frame>,
    closed: CancellationToken,
    closing: AtomicBool,
    connected_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connection with an outbound queue of `capacity` frames
    pub fn new(principal: Principal, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            principal,
            outbound,
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
            connected_at: Utc::now(),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Time since the connection was admitted
    pub fn connected_for(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }

    /// Non-blocking enqueue of a frame
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        if self.closed.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Close the outbound queue. Returns true only for the call that closed it.
    pub fn close(&self) -> bool {
        let first = !self.closing.swap(true, Ordering::AcqRel);
        self.closed.cancel();
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the queue is closed
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Frames currently buffered
    pub fn queued(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("principal", &self.principal)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_until_full() {
        let (conn, mut rx) = Connection::new(Principal::new("alice"), 2);

        assert_eq!(conn.try_enqueue(Frame::from("1")), Ok(()));
        assert_eq!(conn.try_enqueue(Frame::from("2")), Ok(()));
        assert_eq!(conn.queued(), 2);
        assert_eq!(conn.try_enqueue(Frame::from("3")), Err(EnqueueError::Full));

        assert_eq!(rx.try_recv().unwrap().as_ref(), "1");
        assert_eq!(conn.try_enqueue(Frame::from("3")), Ok(()));
    }

    #[test]
    fn test_closed_queue_rejects_frames() {
        let (conn, _rx) = Connection::new(Principal::new("alice"), 4);
        assert!(conn.close());
        assert!(!conn.close());

        assert!(conn.is_closed());
        assert!(conn.close_signal().is_cancelled());
        assert_eq!(conn.try_enqueue(Frame::from("x")), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_dropped_receiver_reports_closed() {
        let (conn, rx) = Connection::new(Principal::new("bob"), 4);
        drop(rx);
        assert_eq!(conn.try_enqueue(Frame::from("x")), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_connected_for_counts_from_admission() {
        let (conn, _rx) = Connection::new(Principal::new("carol"), 4);
        let elapsed = conn.connected_for();

        assert!(elapsed >= chrono::Duration::zero());
        assert!(elapsed < chrono::Duration::seconds(5));
        assert!(conn.connected_at() <= Utc::now());
    }
}

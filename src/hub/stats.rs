//! Hub counters, tracked with atomics so dispatch never takes a lock for them

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    registered: AtomicU64,
    deregistered: AtomicU64,
    evicted: AtomicU64,
    frames_enqueued: AtomicU64,
}

impl HubCounters {
    pub(crate) fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deregistered(&self) {
        self.deregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self, n: usize) {
        self.frames_enqueued.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, connections: usize, rooms: usize) -> HubSnapshot {
        HubSnapshot {
            connections,
            rooms,
            registered: self.registered.load(Ordering::Relaxed),
            deregistered: self.deregistered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubSnapshot {
    /// Live registered connections
    pub connections: usize,
    /// Rooms with at least one local member
    pub rooms: usize,
    pub registered: u64,
    pub deregistered: u64,
    /// Connections dropped for a saturated outbound queue
    pub evicted: u64,
    pub frames_enqueued: u64,
}

//! Relay between the bus and the local hub.
//!
//! Every process publishes room broadcasts to `ws:<room>` and pattern
//! subscribes to `ws:*`. Whatever arrives is dispatched to local members
//! only; a process without members for the room does a no-op lookup. The
//! bridge does not care which process an event came from.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{room_from_topic, room_topic, Bus, BusMessage, BusStream, Result, ROOM_TOPIC_PATTERN};
use crate::hub::{Hub, RoomId};
use crate::protocol::ServerEvent;

/// Delay before re-establishing a subscription that ended
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct BusBridge {
    bus: Arc<dyn Bus>,
}

impl BusBridge {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    /// Publish a room event to every process, surfacing failures
    pub async fn try_publish(&self, room: &RoomId, event: &ServerEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        self.bus.publish(&room_topic(room), &payload).await
    }

    /// Publish a room event to every process. Failures are logged and the
    /// event is dropped.
    pub async fn publish(&self, room: &RoomId, event: &ServerEvent) {
        if let Err(e) = self.try_publish(room, event).await {
            warn!(room = %room, event = %event.kind, error = %e, "Bus publish failed, event dropped");
        }
    }

    /// Subscribe to all room topics and relay them into `hub` until
    /// `shutdown` is cancelled.
    ///
    /// The subscription is active when this returns.
    pub async fn start_relay(&self, hub: Hub, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let stream = self.bus.psubscribe(ROOM_TOPIC_PATTERN).await?;
        let bus = self.bus.clone();
        Ok(tokio::spawn(relay_loop(bus, stream, hub, shutdown)))
    }
}

async fn relay_loop(bus: Arc<dyn Bus>, mut stream: BusStream, hub: Hub, shutdown: CancellationToken) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(msg) => relay(&hub, msg),
            None => {
                warn!("Bus subscription ended, resubscribing");
                match resubscribe(bus.as_ref(), &shutdown).await {
                    Some(renewed) => stream = renewed,
                    None => break,
                }
            }
        }
    }
    info!("Bus relay stopped");
}

async fn resubscribe(bus: &dyn Bus, shutdown: &CancellationToken) -> Option<BusStream> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
        match bus.psubscribe(ROOM_TOPIC_PATTERN).await {
            Ok(stream) => return Some(stream),
            Err(e) => warn!(error = %e, "Bus resubscribe failed"),
        }
    }
}

/// Dispatch one bus message to local members of its room
fn relay(hub: &Hub, msg: BusMessage) {
    let Some(room) = room_from_topic(&msg.topic) else {
        debug!(topic = %msg.topic, "Ignoring non-room topic");
        return;
    };

    let event = match ServerEvent::from_frame(&msg.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(topic = %msg.topic, error = %e, "Dropping undecodable bus message");
            return;
        }
    };

    match event.to_frame() {
        Ok(frame) => {
            let delivered = hub.dispatch(room, frame);
            debug!(room, event = %event.kind, delivered, "Relayed bus event");
        }
        Err(e) => warn!(room, error = %e, "Failed to re-encode bus event"),
    }
}

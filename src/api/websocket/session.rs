//! Per-connection session: read pump, write pump and the driver tying them
//! to the hub.
//!
//! ```text
//!   socket ──► read pump ──► hub (subscribe / unsubscribe) / broadcaster (typing)
//!   socket ◄── write pump ◄── outbound queue ◄── hub dispatch
//! ```
//!
//! Whichever pump stops first ends the session. The queue is closed, the
//! connection deregistered, and the write pump gets one write deadline to
//! flush and say goodbye before it is aborted.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::config::SessionConfig;
use crate::hub::{Connection, HubError, OutboundReceiver, Principal, RoomId};
use crate::protocol::{ChannelRef, ClientOp, GuildRef};

/// Serve an upgraded socket for an admitted principal
pub async fn serve_socket(socket: WebSocket, principal: Principal, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    run_session(sink, stream, principal, state).await;
}

/// Drive one connection over any message sink/stream pair
pub async fn run_session<Si, St, E>(sink: Si, stream: St, principal: Principal, state: Arc<AppState>)
where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (conn, rx) = Connection::new(principal, state.session.outbound_capacity);
    let conn = Arc::new(conn);

    if let Err(e) = state.hub.register(conn.clone()).await {
        warn!(conn_id = %conn.id(), error = %e, "Rejecting connection");
        return;
    }
    info!(conn_id = %conn.id(), principal = %conn.principal(), "Connection opened");

    let mut writer = tokio::spawn(write_pump(sink, rx, conn.clone(), state.session));

    let writer_done = tokio::select! {
        _ = read_pump(stream, &conn, &state) => false,
        _ = &mut writer => true,
    };

    conn.close();
    if let Err(e) = state.hub.deregister(conn.id()).await {
        debug!(conn_id = %conn.id(), error = %e, "Deregister after hub shutdown");
    }

    if !writer_done && timeout(state.session.write_timeout, &mut writer).await.is_err() {
        debug!(conn_id = %conn.id(), "Write pump overran, aborting");
        writer.abort();
    }
}

/// Read client frames until the peer goes away, errors, or stays silent
/// past the idle timeout.
async fn read_pump<St, E>(mut stream: St, conn: &Connection, state: &AppState)
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let idle = state.session.idle_timeout;

    loop {
        let next = match timeout(idle, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!(conn_id = %conn.id(), "Idle timeout");
                break;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                let Some(op) = ClientOp::decode(&text) else {
                    debug!(conn_id = %conn.id(), "Ignoring malformed client frame");
                    continue;
                };
                if apply(op, conn, state).await.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            // Pongs only keep the idle timer alive
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(conn_id = %conn.id(), error = %e, "Read error");
                break;
            }
        }
    }
}

async fn apply(op: ClientOp, conn: &Connection, state: &AppState) -> Result<(), HubError> {
    match op {
        ClientOp::Subscribe(ChannelRef { channel_id }) => {
            join(RoomId::channel(&channel_id), conn, state).await
        }
        ClientOp::SubscribeGuild(GuildRef { guild_id }) => {
            join(RoomId::guild(&guild_id), conn, state).await
        }
        ClientOp::Unsubscribe(ChannelRef { channel_id }) => {
            let room = RoomId::channel(&channel_id);
            debug!(conn_id = %conn.id(), room = %room, "Unsubscribe");
            state.hub.unsubscribe(conn.id(), room).await.map(drop)
        }
        ClientOp::Typing(ChannelRef { channel_id }) => {
            state.broadcaster.typing_start(conn.principal(), &channel_id).await;
            Ok(())
        }
    }
}

async fn join(room: RoomId, conn: &Connection, state: &AppState) -> Result<(), HubError> {
    if !state.policy.may_subscribe(conn.principal(), &room).await {
        debug!(conn_id = %conn.id(), principal = %conn.principal(), room = %room, "Subscription denied");
        return Ok(());
    }
    debug!(conn_id = %conn.id(), room = %room, "Subscribe");
    state.hub.subscribe(conn.id(), room).await.map(drop)
}

/// Drain the outbound queue to the socket, pinging on every idle period.
/// Once the connection is closed the frames already queued are flushed and
/// a Close frame is sent.
async fn write_pump<Si>(mut sink: Si, mut rx: OutboundReceiver, conn: Arc<Connection>, config: SessionConfig)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let closed = conn.close_signal();
    let period = config.ping_interval();
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if !send(&mut sink, Message::Text(frame.to_string()), &conn, &config).await {
                    return;
                }
            }
            _ = ping.tick() => {
                if !send(&mut sink, Message::Ping(Vec::new()), &conn, &config).await {
                    return;
                }
            }
        }
    }

    while let Ok(frame) = rx.try_recv() {
        if !send(&mut sink, Message::Text(frame.to_string()), &conn, &config).await {
            return;
        }
    }
    send(&mut sink, Message::Close(None), &conn, &config).await;
}

/// One bounded write. A failed or late write closes the connection.
async fn send<Si>(sink: &mut Si, msg: Message, conn: &Connection, config: &SessionConfig) -> bool
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let failure = match timeout(config.write_timeout, sink.send(msg)).await {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "write timed out".to_string(),
    };
    debug!(conn_id = %conn.id(), error = %failure, "Write failed");
    conn.close();
    false
}

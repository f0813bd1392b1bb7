//! End-to-end tests: real websocket clients against a gateway on a loopback port

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use aether_gateway::api::auth::Claims;
use aether_gateway::bus::{BusBridge, MemoryBus};
use aether_gateway::hub::{Hub, RoomId};
use aether_gateway::protocol::EventType;
use aether_gateway::{create_router, AppState, EventBroadcaster};

const SECRET: &str = "e2e-test-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Gateway {
    addr: SocketAddr,
    hub: Hub,
    broadcaster: EventBroadcaster,
}

async fn serve(hub: Hub, broadcaster: EventBroadcaster) -> Gateway {
    let state = AppState::new(hub.clone(), SECRET).with_broadcaster(broadcaster.clone());
    let app = create_router(Arc::new(state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Gateway {
        addr,
        hub,
        broadcaster,
    }
}

async fn start_local() -> Gateway {
    let (hub, _control) = Hub::spawn();
    serve(hub.clone(), EventBroadcaster::local(hub)).await
}

async fn start_on_bus(bus: &MemoryBus, shutdown: &CancellationToken) -> Gateway {
    let (hub, _control) = Hub::spawn();
    let bridge = BusBridge::new(Arc::new(bus.clone()));
    bridge.start_relay(hub.clone(), shutdown.clone()).await.unwrap();
    serve(hub.clone(), EventBroadcaster::with_bridge(hub, bridge)).await
}

fn token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: Some(chrono::Utc::now().timestamp() + 3600),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn connect(gateway: &Gateway, sub: &str) -> Client {
    let url = format!("ws://{}/ws?token={}", gateway.addr, token(sub));
    let (client, _response) = connect_async(url).await.unwrap();
    client
}

async fn send_op(client: &mut Client, op: Value) {
    client.send(Message::Text(op.to_string())).await.unwrap();
}

/// Next server event, skipping heartbeats
async fn next_event(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), client.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for_members(hub: &Hub, room: &str, n: usize) {
    for _ in 0..300 {
        if hub.members(room).len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room {room} never reached {n} members");
}

#[tokio::test]
async fn test_missing_and_invalid_tokens_are_rejected() {
    let gateway = start_local().await;

    for url in [
        format!("ws://{}/ws", gateway.addr),
        format!("ws://{}/ws?token=garbage", gateway.addr),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
            other => panic!("expected 401, got {:?}", other.map(|(_, r)| r.status())),
        }
    }
    assert_eq!(gateway.hub.connection_count(), 0);
}

#[tokio::test]
async fn test_subscriber_receives_channel_events() {
    let gateway = start_local().await;
    let mut alice = connect(&gateway, "alice").await;
    let mut bob = connect(&gateway, "bob").await;

    send_op(&mut alice, json!({"op": "SUBSCRIBE", "d": {"channel_id": "general"}})).await;
    wait_for_members(&gateway.hub, "general", 1).await;

    gateway
        .broadcaster
        .to_channel("general", EventType::MessageCreate, json!({"id": "m1", "content": "hi"}))
        .await;

    let event = next_event(&mut alice).await;
    assert_eq!(event, json!({"t": "MESSAGE_CREATE", "d": {"id": "m1", "content": "hi"}}));

    // Bob never subscribed
    let quiet = tokio::time::timeout(Duration::from_millis(200), bob.next()).await;
    assert!(quiet.is_err());
}

#[tokio::test]
async fn test_garbage_frames_do_not_close_the_connection() {
    let gateway = start_local().await;
    let mut client = connect(&gateway, "alice").await;

    client.send(Message::Text("{{{".to_string())).await.unwrap();
    send_op(&mut client, json!({"op": "EXPLODE", "d": {}})).await;
    send_op(&mut client, json!({"op": "SUBSCRIBE", "d": {}})).await;
    client.send(Message::Binary(vec![0xde, 0xad])).await.unwrap();
    send_op(&mut client, json!({"op": "SUBSCRIBE_GUILD", "d": {"guild_id": "7"}})).await;
    wait_for_members(&gateway.hub, "guild:7", 1).await;

    gateway
        .broadcaster
        .to_guild("7", EventType::MemberJoin, json!({"user_id": "bob"}))
        .await;
    assert_eq!(next_event(&mut client).await["t"], "MEMBER_JOIN");
}

#[tokio::test]
async fn test_typing_reaches_room_including_sender() {
    let gateway = start_local().await;
    let mut alice = connect(&gateway, "alice").await;
    let mut bob = connect(&gateway, "bob").await;

    for client in [&mut alice, &mut bob] {
        send_op(client, json!({"op": "SUBSCRIBE", "d": {"channel_id": "c1"}})).await;
    }
    wait_for_members(&gateway.hub, "c1", 2).await;

    send_op(&mut alice, json!({"op": "TYPING", "d": {"channel_id": "c1"}})).await;

    let expected = json!({"t": "TYPING_START", "d": {"user_id": "alice", "channel_id": "c1"}});
    assert_eq!(next_event(&mut bob).await, expected);
    assert_eq!(next_event(&mut alice).await, expected);
}

#[tokio::test]
async fn test_client_close_deregisters() {
    let gateway = start_local().await;
    let mut client = connect(&gateway, "alice").await;
    send_op(&mut client, json!({"op": "SUBSCRIBE", "d": {"channel_id": "c1"}})).await;
    wait_for_members(&gateway.hub, "c1", 1).await;

    client.close(None).await.unwrap();
    wait_for_members(&gateway.hub, "c1", 0).await;
    assert_eq!(gateway.hub.connection_count(), 0);
    assert!(gateway.hub.room_ids().is_empty());
}

#[tokio::test]
async fn test_event_published_on_one_gateway_reaches_another() {
    let bus = MemoryBus::new();
    let shutdown = CancellationToken::new();
    let p1 = start_on_bus(&bus, &shutdown).await;
    let p2 = start_on_bus(&bus, &shutdown).await;

    let mut alice = connect(&p1, "alice").await;
    send_op(&mut alice, json!({"op": "SUBSCRIBE_GUILD", "d": {"guild_id": "7"}})).await;
    wait_for_members(&p1.hub, "guild:7", 1).await;
    assert!(p2.hub.members("guild:7").is_empty());

    p2.broadcaster
        .publish(&RoomId::guild("7"), EventType::LfgCreate, json!({"id": "post-1"}))
        .await;

    assert_eq!(
        next_event(&mut alice).await,
        json!({"t": "LFG_CREATE", "d": {"id": "post-1"}})
    );
    shutdown.cancel();
}

/// TYPING op padded with an ignored field to exactly `len` bytes
fn padded_typing(channel_id: &str, len: usize) -> String {
    let head = format!(r#"{{"op":"TYPING","d":{{"channel_id":"{channel_id}","pad":""#);
    let tail = r#""}}"#;
    let pad = "x".repeat(len - head.len() - tail.len());
    format!("{head}{pad}{tail}")
}

#[tokio::test]
async fn test_frame_size_limit() {
    let gateway = start_local().await;
    let mut client = connect(&gateway, "alice").await;
    send_op(&mut client, json!({"op": "SUBSCRIBE", "d": {"channel_id": "c1"}})).await;
    wait_for_members(&gateway.hub, "c1", 1).await;

    let at_limit = padded_typing("c1", 4096);
    assert_eq!(at_limit.len(), 4096);
    client.send(Message::Text(at_limit)).await.unwrap();
    assert_eq!(next_event(&mut client).await["t"], "TYPING_START");

    let oversized = padded_typing("c1", 5000);
    // The server may already be tearing the socket down
    let _ = client.send(Message::Text(oversized)).await;

    wait_for_members(&gateway.hub, "c1", 0).await;
    for _ in 0..300 {
        if gateway.hub.connection_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("oversized frame did not end the connection");
}

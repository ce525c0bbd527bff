//! End-to-end: boot the router on an ephemeral port and drive it with two
//! WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use parley_db::{MemoryStore, MessageStore};
use parley_server::{App, ServerConfig, StoreBackend, build_app};
use parley_types::{ErrorKind, GatewayCommand, GatewayEvent, MessageStatus, PresenceStatus};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start() -> (SocketAddr, Arc<dyn MessageStore>) {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        store: StoreBackend::Memory,
        ..ServerConfig::default()
    };
    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
    let App { router, .. } = build_app(store.clone(), &config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, store)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/gateway", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, command: GatewayCommand) {
    let text = serde_json::to_string(&command).unwrap();
    ws.send(Message::Text(text.into())).await.unwrap();
}

/// Read frames until one matches `want`, skipping everything else.
async fn expect<F>(ws: &mut Client, want: F) -> GatewayEvent
where
    F: Fn(&GatewayEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let event: GatewayEvent = serde_json::from_str(text.as_str()).unwrap();
                    if want(&event) {
                        return event;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended early: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn join(ws: &mut Client, user_id: &str) -> GatewayEvent {
    send(
        ws,
        GatewayCommand::Join {
            user_id: user_id.into(),
        },
    )
    .await;
    expect(ws, |e| matches!(e, GatewayEvent::Ready { .. })).await
}

#[tokio::test]
async fn two_clients_chat_and_see_presence() {
    let (addr, store) = start().await;

    let mut alice = connect(addr).await;
    join(&mut alice, "alice").await;

    let mut bob = connect(addr).await;
    match join(&mut bob, "bob").await {
        GatewayEvent::Ready { user_id, online } => {
            assert_eq!(user_id, "bob");
            assert_eq!(online.len(), 1);
            assert_eq!(online[0].user_id, "alice");
        }
        other => panic!("unexpected {other:?}"),
    }
    expect(&mut alice, |e| {
        matches!(e, GatewayEvent::UserStatus { user_id, status: PresenceStatus::Online, .. } if user_id == "bob")
    })
    .await;

    send(
        &mut alice,
        GatewayCommand::SendMessage {
            sender_id: "alice".into(),
            receiver_id: "bob".into(),
            content: "hi bob".into(),
            reply_to: None,
        },
    )
    .await;

    let message = match expect(&mut bob, |e| matches!(e, GatewayEvent::ReceiveMessage(_))).await {
        GatewayEvent::ReceiveMessage(message) => message,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(message.content, "hi bob");
    assert_eq!(message.chat_id.as_str(), "alice_bob");

    for ws in [&mut alice, &mut bob] {
        expect(ws, |e| {
            matches!(e, GatewayEvent::MessageStatusUpdate { status: MessageStatus::Delivered, .. })
        })
        .await;
    }

    send(
        &mut bob,
        GatewayCommand::MessageStatus {
            message_id: message.id,
            status: MessageStatus::Read,
            chat_id: "alice_bob".into(),
        },
    )
    .await;
    expect(&mut alice, |e| {
        matches!(e, GatewayEvent::MessageStatusUpdate { status: MessageStatus::Read, .. })
    })
    .await;

    let stored = store.find(message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Read);

    bob.close(None).await.unwrap();
    match expect(&mut alice, |e| {
        matches!(e, GatewayEvent::UserStatus { status: PresenceStatus::Offline, .. })
    })
    .await
    {
        GatewayEvent::UserStatus {
            user_id, last_seen, ..
        } => {
            assert_eq!(user_id, "bob");
            assert!(last_seen.is_some());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_get_an_error_reply() {
    let (addr, _) = start().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("{\"type\":\"dance\"}".into())).await.unwrap();
    match expect(&mut ws, |e| matches!(e, GatewayEvent::Error { .. })).await {
        GatewayEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::BadCommand),
        other => panic!("unexpected {other:?}"),
    }

    // The connection survives and can still join
    join(&mut ws, "carol").await;
}

#[tokio::test]
async fn sending_before_join_is_refused() {
    let (addr, store) = start().await;
    let mut ws = connect(addr).await;

    send(
        &mut ws,
        GatewayCommand::SendMessage {
            sender_id: "mallory".into(),
            receiver_id: "alice".into(),
            content: "boo".into(),
            reply_to: None,
        },
    )
    .await;
    match expect(&mut ws, |e| matches!(e, GatewayEvent::Error { .. })).await {
        GatewayEvent::Error { kind, .. } => assert_eq!(kind, ErrorKind::NotJoined),
        other => panic!("unexpected {other:?}"),
    }
    assert!(store.list_by_participant("alice").await.unwrap().is_empty());
}

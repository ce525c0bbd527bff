use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use parley_types::{ErrorKind, GatewayCommand, GatewayEvent};

use crate::engine::ChatEngine;

/// Longest slice of an undecodable frame echoed into the logs.
const RAW_LOG_CHARS: usize = 200;

/// Drive one WebSocket until either side gives up.
///
/// The server pings every `heartbeat`; two missed pongs in a row drop the
/// connection. Whatever the reason for ending, the hub is told so presence
/// stays accurate.
pub async fn handle_connection(socket: WebSocket, engine: ChatEngine, heartbeat: Duration) {
    let (mut sender, mut receiver) = socket.split();
    let hub = engine.hub().clone();

    let (conn_id, mut conn_rx) = hub.connect().await;
    let mut broadcast_rx = hub.subscribe();
    info!("connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            warn!("connection {} lagged by {} broadcast events", conn_id, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = conn_rx.recv() => {
                    // Channel closed: the hub dropped this connection
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("connection {} missed {} pongs, dropping", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Read commands from client
    let recv_engine = engine.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let reply = match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                        Ok(command) => recv_engine.handle_command(conn_id, command).await,
                        Err(e) => {
                            let raw: String = text.chars().take(RAW_LOG_CHARS).collect();
                            warn!("connection {} bad command: {} -- raw: {}", conn_id, e, raw);
                            Some(GatewayEvent::error(ErrorKind::BadCommand, e.to_string()))
                        }
                    };
                    if let Some(reply) = reply {
                        recv_engine.hub().emit_to_connection(conn_id, reply).await;
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let send_finished = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };
    let survivor = if send_finished { recv_task } else { send_task };
    // A command still in flight must finish unwinding before the hub forgets us
    survivor.abort();
    let _ = survivor.await;

    hub.disconnect(conn_id).await;
    info!("connection {} closed", conn_id);
}

/// Serialize and write one event. Returns false once the socket is gone.
async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            // Not a transport failure; keep the connection
            error!("failed to encode {} event: {}", event.name(), e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

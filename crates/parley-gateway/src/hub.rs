use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info, warn};

use parley_types::{GatewayEvent, UserPresence, validate_user_id};

use crate::error::ChatError;
use crate::presence::{ConnectionId, PresenceRegistry};

const BROADCAST_CAPACITY: usize = 1024;

/// Manages all connected clients and routes events to them.
///
/// Targeted events go through a per-connection channel; presence changes go
/// through one broadcast channel every connection subscribes to.
#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Broadcast channel: every live connection receives every event
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-connection targeted send channels
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<GatewayEvent>>>,

    presence: PresenceRegistry,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
                presence: PresenceRegistry::new(),
            }),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.inner.presence
    }

    /// Subscribe to broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Register a new live connection. Returns its handle and the receiver for
    /// events targeted at it.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let handle = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(handle, tx);
        debug!("connection {} registered", handle);
        (handle, rx)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Bind `handle` to `user_id`, mark the user online and broadcast it.
    /// Returns everyone else who was already online.
    ///
    /// Refused once `handle` has been disconnected. The connections lock is
    /// held until the binding is in place, so a concurrent `disconnect`
    /// either refuses this join or releases it afterwards.
    pub async fn join_channel(
        &self,
        user_id: &str,
        handle: ConnectionId,
    ) -> Result<Vec<UserPresence>, ChatError> {
        validate_user_id(user_id)?;

        let connections = self.inner.connections.read().await;
        if !connections.contains_key(&handle) {
            return Err(ChatError::ConnectionClosed(handle));
        }

        if let Some(previous) = self.inner.presence.user_of(handle).await {
            if previous != user_id {
                info!("connection {} switching from {} to {}", handle, previous, user_id);
                self.release(handle).await;
            }
        }

        let online: Vec<UserPresence> = self
            .inner
            .presence
            .online_users()
            .await
            .into_iter()
            .filter(|p| p.user_id != user_id)
            .collect();

        let registration = self.inner.presence.register_connection(user_id, handle).await;
        // Broadcast before unlocking so an offline event from disconnect follows it
        self.emit_broadcast(GatewayEvent::user_status(&registration.presence));
        drop(connections);

        if let Some(stale) = registration.replaced {
            info!("{} reconnected, connection {} replaced by {}", user_id, stale, handle);
        }
        info!("{} joined on connection {}", user_id, handle);
        Ok(online)
    }

    /// Send `event` to each listed user that has a live connection. Users that
    /// are offline or whose connection has gone away are skipped. Returns how
    /// many connections the event was handed to.
    pub async fn emit_to_users(&self, user_ids: &[&str], event: GatewayEvent) -> usize {
        let mut targets = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(handle) = self.inner.presence.handle_of(user_id).await {
                if !targets.contains(&handle) {
                    targets.push(handle);
                }
            }
        }

        let connections = self.inner.connections.read().await;
        let mut sent = 0;
        for handle in targets {
            match connections.get(&handle) {
                Some(tx) => match tx.send(event.clone()) {
                    Ok(()) => sent += 1,
                    Err(_) => warn!("dropping {} for closed connection {}", event.name(), handle),
                },
                None => debug!("no live channel for connection {}", handle),
            }
        }
        sent
    }

    /// Send `event` to one connection. Returns false if it has gone away.
    pub async fn emit_to_connection(&self, handle: ConnectionId, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        let Some(tx) = connections.get(&handle) else {
            debug!("no live channel for connection {}", handle);
            return false;
        };
        if tx.send(event).is_err() {
            warn!("connection {} closed before its reply was sent", handle);
            return false;
        }
        true
    }

    /// Broadcast an event to all connected clients.
    pub fn emit_broadcast(&self, event: GatewayEvent) {
        // No receivers just means nobody is connected
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Forget `handle`. If it still owned a user, that user goes offline and
    /// the change is broadcast.
    pub async fn disconnect(&self, handle: ConnectionId) -> Option<UserPresence> {
        self.inner.connections.write().await.remove(&handle);
        let offline = self.release(handle).await;
        debug!("connection {} removed", handle);
        offline
    }

    /// Disconnect every live connection. Closing the targeted channels ends
    /// each connection loop. Returns how many were dropped.
    pub async fn drain(&self) -> usize {
        let handles: Vec<ConnectionId> = {
            let mut connections = self.inner.connections.write().await;
            connections.drain().map(|(handle, _)| handle).collect()
        };
        for handle in &handles {
            self.release(*handle).await;
        }
        if !handles.is_empty() {
            info!("drained {} connections", handles.len());
        }
        handles.len()
    }

    async fn release(&self, handle: ConnectionId) -> Option<UserPresence> {
        let offline = self.inner.presence.unregister_connection(handle).await?;
        info!("{} went offline", offline.user_id);
        self.emit_broadcast(GatewayEvent::user_status(&offline));
        Some(offline)
    }
}

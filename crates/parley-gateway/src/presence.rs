use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use parley_types::UserPresence;

/// Opaque handle for one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
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

#[derive(Debug, Clone)]
struct PresenceEntry {
    handle: Option<ConnectionId>,
    last_seen: Option<DateTime<Utc>>,
}

impl PresenceEntry {
    fn snapshot(&self, user_id: &str) -> UserPresence {
        UserPresence {
            user_id: user_id.to_string(),
            is_online: self.handle.is_some(),
            last_seen: self.last_seen,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// user_id -> presence
    users: HashMap<String, PresenceEntry>,
    /// Reverse index: connection -> user_id it is bound to
    owners: HashMap<ConnectionId, String>,
}

/// Result of binding a connection to a user.
#[derive(Debug, Clone)]
pub struct Registration {
    pub presence: UserPresence,
    /// Previous connection of the same user, which no longer owns the identity
    pub replaced: Option<ConnectionId>,
}

/// Maps users to their current connection and tracks last-seen times.
///
/// At most one connection per user. Registering a second one replaces the
/// first; unregistering a connection that no longer owns the user is a no-op.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<RegistryInner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `user_id` and mark the user online. If `handle` was
    /// bound to another user, that binding is dropped without touching the
    /// other user's online state; callers release it first.
    pub async fn register_connection(&self, user_id: &str, handle: ConnectionId) -> Registration {
        let mut inner = self.inner.write().await;

        if let Some(previous_owner) = inner.owners.insert(handle, user_id.to_string()) {
            if previous_owner != user_id {
                if let Some(entry) = inner.users.get_mut(&previous_owner) {
                    if entry.handle == Some(handle) {
                        entry.handle = None;
                        entry.last_seen = Some(Utc::now());
                    }
                }
            }
        }

        let entry = inner
            .users
            .entry(user_id.to_string())
            .or_insert(PresenceEntry {
                handle: None,
                last_seen: None,
            });

        let replaced = entry.handle.filter(|old| *old != handle);
        entry.handle = Some(handle);
        entry.last_seen = None;
        let presence = entry.snapshot(user_id);

        if let Some(old) = replaced {
            inner.owners.remove(&old);
        }

        Registration { presence, replaced }
    }

    /// Release `handle`. Returns the user's new (offline) presence when the
    /// handle still owned a user, None otherwise.
    pub async fn unregister_connection(&self, handle: ConnectionId) -> Option<UserPresence> {
        let mut inner = self.inner.write().await;
        let user_id = inner.owners.remove(&handle)?;
        let entry = inner.users.get_mut(&user_id)?;
        if entry.handle != Some(handle) {
            return None;
        }
        entry.handle = None;
        entry.last_seen = Some(Utc::now());
        Some(entry.snapshot(&user_id))
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.inner
            .read()
            .await
            .users
            .get(user_id)
            .is_some_and(|e| e.handle.is_some())
    }

    pub async fn handle_of(&self, user_id: &str) -> Option<ConnectionId> {
        self.inner.read().await.users.get(user_id)?.handle
    }

    /// The user currently bound to `handle`.
    pub async fn user_of(&self, handle: ConnectionId) -> Option<String> {
        self.inner.read().await.owners.get(&handle).cloned()
    }

    /// Presence for any user; never-seen users are offline with no last-seen.
    pub async fn presence_of(&self, user_id: &str) -> UserPresence {
        self.inner
            .read()
            .await
            .users
            .get(user_id)
            .map(|e| e.snapshot(user_id))
            .unwrap_or_else(|| UserPresence::unknown(user_id))
    }

    /// Everyone currently online, sorted by user id.
    pub async fn online_users(&self) -> Vec<UserPresence> {
        let inner = self.inner.read().await;
        let mut online: Vec<UserPresence> = inner
            .users
            .iter()
            .filter(|(_, e)| e.handle.is_some())
            .map(|(id, e)| e.snapshot(id))
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        online
    }
}

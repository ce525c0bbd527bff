use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_db::{MemoryStore, MessageStore, NewMessage, ReactionOutcome, StatusUpdate, StoreError};
use parley_types::{ChatId, GatewayEvent, Message, MessageStatus};

use crate::hub::ConnectionHub;
use crate::presence::ConnectionId;

/// Everything queued on a connection channel right now.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn memory_store() -> Arc<dyn MessageStore> {
    Arc::new(MemoryStore::new())
}

/// Connect and join `user_id`.
pub async fn joined(
    hub: &ConnectionHub,
    user_id: &str,
) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
    let (handle, rx) = hub.connect().await;
    hub.join_channel(user_id, handle).await.unwrap();
    (handle, rx)
}

/// A store whose backend is down.
pub struct UnavailableStore;

fn down() -> StoreError {
    StoreError::Unavailable("backend offline".into())
}

#[async_trait]
impl MessageStore for UnavailableStore {
    async fn create(&self, _new: NewMessage) -> Result<Message, StoreError> {
        Err(down())
    }

    async fn find(&self, _id: Uuid) -> Result<Option<Message>, StoreError> {
        Err(down())
    }

    async fn set_status(&self, _id: Uuid, _status: MessageStatus) -> Result<(), StoreError> {
        Err(down())
    }

    async fn advance_status(
        &self,
        _id: Uuid,
        _status: MessageStatus,
    ) -> Result<StatusUpdate, StoreError> {
        Err(down())
    }

    async fn add_reaction(
        &self,
        _id: Uuid,
        _user_id: &str,
        _emoji: &str,
    ) -> Result<ReactionOutcome, StoreError> {
        Err(down())
    }

    async fn list_by_chat(&self, _chat_id: &ChatId) -> Result<Vec<Message>, StoreError> {
        Err(down())
    }

    async fn list_by_participant(&self, _user_id: &str) -> Result<Vec<Message>, StoreError> {
        Err(down())
    }
}

/// A store that never answers writes.
pub struct StalledStore;

async fn stall<T>() -> Result<T, StoreError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Err(down())
}

#[async_trait]
impl MessageStore for StalledStore {
    async fn create(&self, _new: NewMessage) -> Result<Message, StoreError> {
        stall().await
    }

    async fn find(&self, _id: Uuid) -> Result<Option<Message>, StoreError> {
        stall().await
    }

    async fn set_status(&self, _id: Uuid, _status: MessageStatus) -> Result<(), StoreError> {
        stall().await
    }

    async fn advance_status(
        &self,
        _id: Uuid,
        _status: MessageStatus,
    ) -> Result<StatusUpdate, StoreError> {
        stall().await
    }

    async fn add_reaction(
        &self,
        _id: Uuid,
        _user_id: &str,
        _emoji: &str,
    ) -> Result<ReactionOutcome, StoreError> {
        stall().await
    }

    async fn list_by_chat(&self, _chat_id: &ChatId) -> Result<Vec<Message>, StoreError> {
        stall().await
    }

    async fn list_by_participant(&self, _user_id: &str) -> Result<Vec<Message>, StoreError> {
        stall().await
    }
}

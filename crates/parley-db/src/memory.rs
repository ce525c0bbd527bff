use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use parley_types::{ChatId, Message, MessageStatus, Reaction};

use crate::store::{MessageStore, NewMessage, ReactionOutcome, StatusUpdate, StoreError, now_millis};

/// Process-local `MessageStore`. Nothing survives a restart; used by tests and
/// by `PARLEY_STORE=memory`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    messages: HashMap<Uuid, Message>,
    /// Insertion order, used as the tie-break for equal timestamps
    order: Vec<Uuid>,
    latest_by_chat: HashMap<ChatId, DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(inner: &MemoryInner, keep: F) -> Vec<Message>
    where
        F: Fn(&Message) -> bool,
    {
        let mut out: Vec<Message> = inner
            .order
            .iter()
            .filter_map(|id| inner.messages.get(id))
            .filter(|m| keep(m))
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order
        out.sort_by_key(|m| m.timestamp);
        out
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create(&self, new: NewMessage) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;

        let mut timestamp = now_millis();
        if let Some(latest) = inner.latest_by_chat.get(&new.chat_id) {
            timestamp = timestamp.max(*latest);
        }

        let message = Message {
            id: Uuid::new_v4(),
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            content: new.content,
            timestamp,
            status: MessageStatus::Sent,
            reply_to: new.reply_to,
            reactions: vec![],
        };

        inner
            .latest_by_chat
            .insert(message.chat_id.clone(), timestamp);
        inner.order.push(message.id);
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self.inner.read().await.messages.get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let message = inner.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        message.status = status;
        Ok(())
    }

    async fn advance_status(
        &self,
        id: Uuid,
        status: MessageStatus,
    ) -> Result<StatusUpdate, StoreError> {
        let mut inner = self.inner.write().await;
        let message = inner.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !message.status.can_advance_to(status) {
            return Ok(StatusUpdate::Rejected {
                current: message.status,
            });
        }
        message.status = status;
        Ok(StatusUpdate::Applied)
    }

    async fn add_reaction(
        &self,
        id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> Result<ReactionOutcome, StoreError> {
        // Check and append under the same write guard
        let mut inner = self.inner.write().await;
        let message = inner.messages.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if message.has_reaction(user_id, emoji) {
            return Ok(ReactionOutcome { accepted: false });
        }
        message.reactions.push(Reaction {
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(ReactionOutcome { accepted: true })
    }

    async fn list_by_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        Ok(Self::collect(&inner, |m| &m.chat_id == chat_id))
    }

    async fn list_by_participant(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        Ok(Self::collect(&inner, |m| m.chat_id.includes(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_message(from: &str, to: &str) -> NewMessage {
        NewMessage {
            chat_id: ChatId::derive(from, to).unwrap(),
            sender_id: from.into(),
            content: "hello".into(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn timestamps_never_go_backwards_within_a_chat() {
        let store = MemoryStore::new();
        let mut last = None;
        for _ in 0..50 {
            let msg = store.create(new_message("a", "b")).await.unwrap();
            if let Some(prev) = last {
                assert!(msg.timestamp >= prev);
            }
            last = Some(msg.timestamp);
        }
    }

    #[tokio::test]
    async fn concurrent_reactions_all_survive() {
        let store = Arc::new(MemoryStore::new());
        let id = store.create(new_message("a", "b")).await.unwrap().id;

        let mut handles = Vec::new();
        for user in ["a", "b"] {
            for emoji in ["👍", "🎉", "👍"] {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store.add_reaction(id, user, emoji).await.unwrap().accepted
                }));
            }
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 4);
        assert_eq!(store.find(id).await.unwrap().unwrap().reactions.len(), 4);
    }

    #[tokio::test]
    async fn participant_listing_excludes_other_chats() {
        let store = MemoryStore::new();
        store.create(new_message("a", "b")).await.unwrap();
        store.create(new_message("b", "c")).await.unwrap();
        store.create(new_message("c", "a")).await.unwrap();

        let for_a = store.list_by_participant("a").await.unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|m| m.chat_id.includes("a")));
    }

    #[tokio::test]
    async fn unknown_message_is_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.set_status(id, MessageStatus::Read).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
        assert!(matches!(
            store.advance_status(id, MessageStatus::Read).await,
            Err(StoreError::NotFound(_))
        ));
    }
}

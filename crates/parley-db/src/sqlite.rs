use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};
use uuid::Uuid;

use parley_types::{ChatId, Message, MessageStatus, Reaction};

use crate::{Database, WriteGate};
use crate::models::MessageRow;
use crate::store::{MessageStore, NewMessage, ReactionOutcome, StatusUpdate, StoreError, now_millis};

/// `MessageStore` over the SQLite `Database`. Every call runs on the blocking
/// pool so the async runtime never waits on disk.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Unavailable(format!("store task failed: {}", e))
            })?
    }

    /// Like `blocking`, for writes. If the caller stops waiting (a timeout
    /// dropping this future), the gate is abandoned and the write never
    /// commits.
    async fn write<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database, &WriteGate) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let gate = WriteGate::new();
        let mut guard = AbandonOnDrop(Some(gate.clone()));
        let joined = tokio::task::spawn_blocking(move || f(&db, &gate)).await;
        guard.0 = None;
        joined.map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StoreError::Unavailable(format!("store task failed: {}", e))
        })?
    }
}

struct AbandonOnDrop(Option<WriteGate>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if let Some(gate) = self.0.take() {
            if gate.abandon() {
                warn!("Store write committed after its caller stopped waiting");
            }
        }
    }
}

/// Attach reactions to rows and decode them. Corrupt rows are logged and
/// skipped so one bad record cannot hide a whole history.
fn assemble(db: &Database, rows: Vec<MessageRow>) -> Result<Vec<Message>, StoreError> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let mut reactions: HashMap<String, Vec<Reaction>> = HashMap::new();
    for r in db.get_reactions_for_messages(&ids)? {
        reactions.entry(r.message_id.clone()).or_default().push(r.into());
    }

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let attached = reactions.remove(&row.id).unwrap_or_default();
        match row.into_message(attached) {
            Ok(msg) => messages.push(msg),
            Err(e) => warn!("Skipping unreadable message: {}", e),
        }
    }
    Ok(messages)
}

fn load(db: &Database, id: Uuid) -> Result<Option<Message>, StoreError> {
    let Some(row) = db.get_message(&id.to_string())? else {
        return Ok(None);
    };
    let reactions = db
        .get_reactions_for_messages(std::slice::from_ref(&row.id))?
        .into_iter()
        .map(Reaction::from)
        .collect();
    row.into_message(reactions).map(Some)
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create(&self, new: NewMessage) -> Result<Message, StoreError> {
        let id = Uuid::new_v4();
        let proposed = now_millis();

        let (a, b) = new.chat_id.participants();
        let row = MessageRow {
            id: id.to_string(),
            chat_id: new.chat_id.to_string(),
            participant_a: a.to_string(),
            participant_b: b.to_string(),
            sender_id: new.sender_id.clone(),
            content: new.content.clone(),
            status: MessageStatus::Sent.as_str().to_string(),
            reply_to: new.reply_to.map(|r| r.to_string()),
            created_at: proposed.timestamp_millis(),
        };

        let stored_at = self
            .write(move |db, gate| db.insert_message(gate, &row).map_err(StoreError::from))
            .await?;

        Ok(Message {
            id,
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            content: new.content,
            timestamp: chrono::DateTime::from_timestamp_millis(stored_at).unwrap_or(proposed),
            status: MessageStatus::Sent,
            reply_to: new.reply_to,
            reactions: vec![],
        })
    }

    async fn find(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        self.blocking(move |db| load(db, id)).await
    }

    async fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError> {
        let found = self
            .write(move |db, gate| {
                db.set_message_status(gate, &id.to_string(), status)
                    .map_err(StoreError::from)
            })
            .await?;
        if found { Ok(()) } else { Err(StoreError::NotFound(id)) }
    }

    async fn advance_status(
        &self,
        id: Uuid,
        status: MessageStatus,
    ) -> Result<StatusUpdate, StoreError> {
        self.write(move |db, gate| {
            db.advance_message_status(gate, &id.to_string(), status)?
                .ok_or(StoreError::NotFound(id))
        })
        .await
    }

    async fn add_reaction(
        &self,
        id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> Result<ReactionOutcome, StoreError> {
        let user_id = user_id.to_string();
        let emoji = emoji.to_string();
        let created_at = now_millis().timestamp_millis();

        let added = self
            .write(move |db, gate| {
                db.insert_reaction(gate, &id.to_string(), &user_id, &emoji, created_at)?
                    .ok_or(StoreError::NotFound(id))
            })
            .await?;
        Ok(ReactionOutcome { accepted: added })
    }

    async fn list_by_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, StoreError> {
        let chat_id = chat_id.to_string();
        self.blocking(move |db| {
            let rows = db.get_messages_by_chat(&chat_id)?;
            assemble(db, rows)
        })
        .await
    }

    async fn list_by_participant(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let user_id = user_id.to_string();
        self.blocking(move |db| {
            let rows = db.get_messages_by_participant(&user_id)?;
            assemble(db, rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::new(Database::open_in_memory().unwrap())
    }

    fn new_message(from: &str, to: &str, content: &str) -> NewMessage {
        NewMessage {
            chat_id: ChatId::derive(from, to).unwrap(),
            sender_id: from.into(),
            content: content.into(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = store();
        let created = store.create(new_message("u1", "u2", "hi")).await.unwrap();
        assert_eq!(created.status, MessageStatus::Sent);
        assert!(created.reactions.is_empty());

        let found = store.find(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert!(store.find(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reply_to_round_trips() {
        let store = store();
        let first = store.create(new_message("u1", "u2", "first")).await.unwrap();
        let mut reply = new_message("u2", "u1", "second");
        reply.reply_to = Some(first.id);
        let second = store.create(reply).await.unwrap();

        let found = store.find(second.id).await.unwrap().unwrap();
        assert_eq!(found.reply_to, Some(first.id));
    }

    #[tokio::test]
    async fn reactions_keep_insertion_order() {
        let store = store();
        let msg = store.create(new_message("u1", "u2", "hi")).await.unwrap();

        assert!(store.add_reaction(msg.id, "u2", "❤️").await.unwrap().accepted);
        assert!(store.add_reaction(msg.id, "u1", "😂").await.unwrap().accepted);
        assert!(!store.add_reaction(msg.id, "u2", "❤️").await.unwrap().accepted);

        let found = store.find(msg.id).await.unwrap().unwrap();
        let emojis: Vec<&str> = found.reactions.iter().map(|r| r.emoji.as_str()).collect();
        assert_eq!(emojis, vec!["❤️", "😂"]);

        let missing = store.add_reaction(Uuid::new_v4(), "u1", "👍").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn status_writes() {
        let store = store();
        let msg = store.create(new_message("u1", "u2", "hi")).await.unwrap();

        store.set_status(msg.id, MessageStatus::Read).await.unwrap();
        assert_eq!(
            store.advance_status(msg.id, MessageStatus::Delivered).await.unwrap(),
            StatusUpdate::Rejected { current: MessageStatus::Read }
        );
        assert!(matches!(
            store.set_status(Uuid::new_v4(), MessageStatus::Read).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn listings_are_ordered() {
        let store = store();
        let m1 = store.create(new_message("u1", "u2", "one")).await.unwrap();
        let m2 = store.create(new_message("u3", "u1", "two")).await.unwrap();
        let m3 = store.create(new_message("u2", "u1", "three")).await.unwrap();

        let chat = ChatId::derive("u1", "u2").unwrap();
        let ids: Vec<Uuid> = store.list_by_chat(&chat).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![m1.id, m3.id]);

        let ids: Vec<Uuid> = store
            .list_by_participant("u1")
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![m1.id, m2.id, m3.id]);
    }

    #[tokio::test]
    async fn timed_out_create_never_lands() {
        let store = store();

        // Keep the connection busy so the insert queues behind it
        let (locked_tx, locked_rx) = tokio::sync::oneshot::channel();
        let db = store.db.clone();
        let holder = tokio::task::spawn_blocking(move || {
            db.with_conn(|_| {
                let _ = locked_tx.send(());
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
        });
        locked_rx.await.unwrap();

        let attempt = tokio::time::timeout(
            Duration::from_millis(20),
            store.create(new_message("u1", "u2", "late")),
        )
        .await;
        assert!(attempt.is_err());

        holder.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let chat = ChatId::derive("u1", "u2").unwrap();
        assert!(store.list_by_chat(&chat).await.unwrap().is_empty());
    }
}

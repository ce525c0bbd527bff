use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use parley_types::{ChatId, Message, MessageStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    NotFound(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        Self::Unavailable(format!("{e:#}"))
    }
}

/// Everything the caller supplies for a new message. Id, timestamp and the
/// initial `sent` status are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub sender_id: String,
    pub content: String,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionOutcome {
    /// false when the same (user, emoji) pair was already on the message
    pub accepted: bool,
}

/// Result of a forward-only status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    Rejected { current: MessageStatus },
}

/// Durable storage for messages and their mutable sub-state.
///
/// Implementations must make `add_reaction` and `advance_status` atomic with
/// respect to concurrent callers on the same message.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message with status `sent` and no reactions.
    async fn create(&self, new: NewMessage) -> Result<Message, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Message>, StoreError>;

    /// Unconditional overwrite.
    async fn set_status(&self, id: Uuid, status: MessageStatus) -> Result<(), StoreError>;

    /// Overwrite only if `status` does not move the message backwards.
    async fn advance_status(
        &self,
        id: Uuid,
        status: MessageStatus,
    ) -> Result<StatusUpdate, StoreError>;

    async fn add_reaction(
        &self,
        id: Uuid,
        user_id: &str,
        emoji: &str,
    ) -> Result<ReactionOutcome, StoreError>;

    /// Messages of one chat, oldest first.
    async fn list_by_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>, StoreError>;

    /// Messages of every chat `user_id` takes part in, oldest first.
    async fn list_by_participant(&self, user_id: &str) -> Result<Vec<Message>, StoreError>;
}

/// Current time truncated to the millisecond precision both backends store.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

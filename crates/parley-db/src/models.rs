/// Database row types. These map directly to SQLite rows and are kept apart
/// from the parley-types models so the schema can move independently.
use chrono::DateTime;
use parley_types::{ChatId, Message, MessageStatus, Reaction};
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub sender_id: String,
    pub content: String,
    pub status: String,
    pub reply_to: Option<String>,
    /// Unix milliseconds
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub id: i64,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: i64,
}

impl MessageRow {
    /// Decode the row into the wire model, attaching its reactions in
    /// insertion order.
    pub fn into_message(self, reactions: Vec<Reaction>) -> Result<Message, StoreError> {
        let corrupt = |what: &str, value: &str| {
            StoreError::Corrupt(format!("{} '{}' on message '{}'", what, value, self.id))
        };

        let id: Uuid = self.id.parse().map_err(|_| corrupt("id", &self.id))?;
        let chat_id = ChatId::parse(&self.chat_id).map_err(|_| corrupt("chat_id", &self.chat_id))?;
        let status: MessageStatus = self
            .status
            .parse()
            .map_err(|_| corrupt("status", &self.status))?;
        let reply_to = match &self.reply_to {
            Some(raw) => Some(raw.parse::<Uuid>().map_err(|_| corrupt("reply_to", raw))?),
            None => None,
        };
        let timestamp = DateTime::from_timestamp_millis(self.created_at)
            .ok_or_else(|| corrupt("created_at", &self.created_at.to_string()))?;

        Ok(Message {
            id,
            chat_id,
            sender_id: self.sender_id,
            content: self.content,
            timestamp,
            status,
            reply_to,
            reactions,
        })
    }
}

impl From<ReactionRow> for Reaction {
    fn from(row: ReactionRow) -> Self {
        Reaction {
            user_id: row.user_id,
            emoji: row.emoji,
        }
    }
}

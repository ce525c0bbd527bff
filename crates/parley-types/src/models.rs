use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat_id::ChatId;

/// Longest message body accepted, in characters.
pub const MAX_CONTENT_CHARS: usize = 4096;

/// Longest emoji value accepted, in bytes. Generous enough for ZWJ sequences.
pub const MAX_EMOJI_BYTES: usize = 32;

/// Delivery lifecycle of a message. Ordered: `Sent < Delivered < Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle forward-only.
    /// Re-writing the same status counts as forward.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next >= *self
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(format!("unknown message status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// A persisted chat message, as stored and as fanned out to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub reply_to: Option<Uuid>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn has_reaction(&self, user_id: &str, emoji: &str) -> bool {
        self.reactions
            .iter()
            .any(|r| r.user_id == user_id && r.emoji == emoji)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Presence of one user as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub user_id: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl UserPresence {
    /// Presence for a user the registry has never seen.
    pub fn unknown(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_online: false,
            last_seen: None,
        }
    }

    pub fn status(&self) -> PresenceStatus {
        if self.is_online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_is_lifecycle_order() {
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(MessageStatus::Delivered.can_advance_to(MessageStatus::Read));
        assert!(MessageStatus::Read.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn status_text_form() {
        for status in [MessageStatus::Sent, MessageStatus::Delivered, MessageStatus::Read] {
            assert_eq!(status.as_str().parse::<MessageStatus>(), Ok(status));
        }
        assert!("seen".parse::<MessageStatus>().is_err());
    }

    #[test]
    fn message_serializes_camel_case() {
        let msg = Message {
            id: Uuid::nil(),
            chat_id: ChatId::derive("u1", "u2").unwrap(),
            sender_id: "u1".into(),
            content: "hi".into(),
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            status: MessageStatus::Sent,
            reply_to: None,
            reactions: vec![],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["chatId"], "u1_u2");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["status"], "sent");
        assert!(json["replyTo"].is_null());
    }
}

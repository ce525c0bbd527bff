use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat_id::ChatId;
use crate::models::{Message, MessageStatus, PresenceStatus, UserPresence};

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Reply to `join`: the bound identity plus everyone already online
    Ready {
        user_id: String,
        online: Vec<UserPresence>,
    },

    /// A message was persisted in a chat this user takes part in
    ReceiveMessage(Message),

    /// A message moved through its delivery lifecycle
    MessageStatusUpdate {
        message_id: Uuid,
        status: MessageStatus,
        chat_id: ChatId,
    },

    /// A reaction was added to a message
    ReactionUpdate {
        message_id: Uuid,
        user_id: String,
        emoji: String,
        chat_id: ChatId,
    },

    /// Reply to a `reactionUpdate` that was already recorded. Sent to the
    /// reacting connection only.
    ReactionDuplicate {
        message_id: Uuid,
        user_id: String,
        emoji: String,
        chat_id: ChatId,
    },

    /// A user came online or went offline
    UserStatus {
        user_id: String,
        status: PresenceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },

    /// The peer started typing
    Typing { user_id: String, chat_id: ChatId },

    /// The peer stopped typing
    StopTyping { user_id: String, chat_id: ChatId },

    /// A command from this connection failed
    Error { kind: ErrorKind, message: String },
}

impl GatewayEvent {
    /// Wire name of the event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::MessageStatusUpdate { .. } => "messageStatusUpdate",
            Self::ReactionUpdate { .. } => "reactionUpdate",
            Self::ReactionDuplicate { .. } => "reactionDuplicate",
            Self::UserStatus { .. } => "userStatus",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stopTyping",
            Self::Error { .. } => "error",
        }
    }

    pub fn user_status(presence: &UserPresence) -> Self {
        Self::UserStatus {
            user_id: presence.user_id.clone(),
            status: presence.status(),
            last_seen: presence.last_seen,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Identifiers stay as plain strings here; the engine validates them so a bad
/// id is answered with a typed error instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Bind this connection to a user channel
    Join { user_id: String },

    /// Send a chat message to another user
    SendMessage {
        sender_id: String,
        receiver_id: String,
        content: String,
        #[serde(default)]
        reply_to: Option<Uuid>,
    },

    /// Acknowledge a message as delivered or read
    MessageStatus {
        message_id: Uuid,
        status: MessageStatus,
        chat_id: String,
    },

    /// React to a message with an emoji
    ReactionUpdate {
        message_id: Uuid,
        user_id: String,
        emoji: String,
        chat_id: String,
    },

    /// Indicate typing in a chat
    Typing { chat_id: String, user_id: String },

    /// Indicate typing stopped in a chat
    StopTyping { chat_id: String, user_id: String },
}

impl GatewayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SendMessage { .. } => "sendMessage",
            Self::MessageStatus { .. } => "messageStatus",
            Self::ReactionUpdate { .. } => "reactionUpdate",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stopTyping",
        }
    }
}

/// Failure categories reported back to the originating connection. A repeated
/// reaction is not one of them; it is answered with `reactionDuplicate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidIdentity,
    InvalidContent,
    PersistenceError,
    NotFound,
    ChatMismatch,
    StatusRegression,
    NotJoined,
    BadCommand,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_send_message_without_reply() {
        let raw = json!({
            "type": "sendMessage",
            "data": { "senderId": "u1", "receiverId": "u2", "content": "hi" }
        });
        let cmd: GatewayCommand = serde_json::from_value(raw).unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::SendMessage {
                sender_id: "u1".into(),
                receiver_id: "u2".into(),
                content: "hi".into(),
                reply_to: None,
            }
        );
    }

    #[test]
    fn decodes_message_status() {
        let id = Uuid::new_v4();
        let raw = json!({
            "type": "messageStatus",
            "data": { "messageId": id, "status": "read", "chatId": "u1_u2" }
        });
        let cmd: GatewayCommand = serde_json::from_value(raw).unwrap();
        assert_eq!(cmd.name(), "messageStatus");
        assert!(matches!(
            cmd,
            GatewayCommand::MessageStatus { status: MessageStatus::Read, .. }
        ));
    }

    #[test]
    fn rejects_unknown_command() {
        let raw = json!({ "type": "deleteMessage", "data": {} });
        assert!(serde_json::from_value::<GatewayCommand>(raw).is_err());
    }

    #[test]
    fn user_status_omits_missing_last_seen() {
        let event = GatewayEvent::user_status(&UserPresence {
            user_id: "u1".into(),
            is_online: true,
            last_seen: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "userStatus");
        assert_eq!(json["data"]["status"], "online");
        assert!(json["data"].get("lastSeen").is_none());
    }

    #[test]
    fn error_event_shape() {
        let event = GatewayEvent::error(ErrorKind::ChatMismatch, "wrong chat");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({
            "type": "error",
            "data": { "kind": "chatMismatch", "message": "wrong chat" }
        }));
    }

    #[test]
    fn error_kinds_are_camel_case_failures_only() {
        assert_eq!(
            serde_json::to_value(ErrorKind::PersistenceError).unwrap(),
            json!("persistenceError")
        );
        assert_eq!(
            serde_json::from_value::<ErrorKind>(json!("statusRegression")).unwrap(),
            ErrorKind::StatusRegression
        );
        assert!(serde_json::from_value::<ErrorKind>(json!("duplicateReaction")).is_err());
    }
}

use thiserror::Error;
use uuid::Uuid;

use parley_db::StoreError;
use parley_types::{ErrorKind, GatewayEvent, IdentityError, MessageStatus};

use crate::presence::ConnectionId;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    #[error("connection is bound to '{bound}' but the command claims '{claimed}'")]
    Impersonation { bound: String, claimed: String },

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("message {0} not found")]
    NotFound(Uuid),

    #[error("message {message_id} belongs to chat {actual}, not {claimed}")]
    ChatMismatch {
        message_id: Uuid,
        claimed: String,
        actual: String,
    },

    #[error("user '{user_id}' is not a participant of chat {chat_id}")]
    NotParticipant { user_id: String, chat_id: String },

    #[error("message {message_id} is already {current}, refusing to move it back to {requested}")]
    StatusRegression {
        message_id: Uuid,
        current: MessageStatus,
        requested: MessageStatus,
    },

    #[error("connection has not joined a user channel")]
    NotJoined,

    #[error("connection {0} is already closed")]
    ConnectionClosed(ConnectionId),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentity(_) | Self::Impersonation { .. } => ErrorKind::InvalidIdentity,
            Self::InvalidContent(_) => ErrorKind::InvalidContent,
            Self::Persistence(_) => ErrorKind::PersistenceError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ChatMismatch { .. } | Self::NotParticipant { .. } => ErrorKind::ChatMismatch,
            Self::StatusRegression { .. } => ErrorKind::StatusRegression,
            Self::NotJoined | Self::ConnectionClosed(_) => ErrorKind::NotJoined,
        }
    }

    /// The direct reply sent to the connection whose command failed.
    pub fn to_event(&self) -> GatewayEvent {
        GatewayEvent::error(self.kind(), self.to_string())
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Persistence(other.to_string()),
        }
    }
}

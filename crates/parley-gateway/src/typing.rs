use tracing::debug;

use parley_types::{ChatId, GatewayEvent};

use crate::error::ChatError;
use crate::hub::ConnectionHub;

/// Forwards ephemeral typing indicators to the other participant of a chat.
/// Nothing is stored; an indicator for an offline peer is simply dropped.
#[derive(Clone)]
pub struct TypingRelay {
    hub: ConnectionHub,
}

impl TypingRelay {
    pub fn new(hub: ConnectionHub) -> Self {
        Self { hub }
    }

    pub async fn notify_typing(&self, chat_id: &str, user_id: &str) -> Result<usize, ChatError> {
        let chat_id = ChatId::parse(chat_id)?;
        self.relay(&chat_id, user_id, |user_id, chat_id| GatewayEvent::Typing {
            user_id,
            chat_id,
        })
        .await
    }

    pub async fn notify_stop_typing(&self, chat_id: &str, user_id: &str) -> Result<usize, ChatError> {
        let chat_id = ChatId::parse(chat_id)?;
        self.relay(&chat_id, user_id, |user_id, chat_id| GatewayEvent::StopTyping {
            user_id,
            chat_id,
        })
        .await
    }

    /// Send to the peer only. In a self-chat there is nobody else to tell.
    async fn relay<F>(&self, chat_id: &ChatId, user_id: &str, event: F) -> Result<usize, ChatError>
    where
        F: FnOnce(String, ChatId) -> GatewayEvent,
    {
        let peer = chat_id
            .peer_of(user_id)
            .ok_or_else(|| ChatError::NotParticipant {
                user_id: user_id.to_string(),
                chat_id: chat_id.to_string(),
            })?;
        if peer == user_id {
            return Ok(0);
        }

        let sent = self
            .hub
            .emit_to_users(&[peer], event(user_id.to_string(), chat_id.clone()))
            .await;
        if sent == 0 {
            debug!("typing indicator for offline {} dropped", peer);
        }
        Ok(sent)
    }
}

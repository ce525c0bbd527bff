use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use parley_db::MessageStore;
use parley_types::models::MAX_EMOJI_BYTES;
use parley_types::{GatewayEvent, Reaction, validate_user_id};

use crate::error::ChatError;
use crate::hub::ConnectionHub;
use crate::pipeline::bounded;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionResult {
    Added(Reaction),
    /// The same user already reacted with the same emoji; nothing changed
    Duplicate,
}

/// Records reactions at most once per (message, user, emoji) and fans
/// accepted ones out to both participants.
#[derive(Clone)]
pub struct ReactionAggregator {
    store: Arc<dyn MessageStore>,
    hub: ConnectionHub,
    persist_timeout: Duration,
}

impl ReactionAggregator {
    pub fn new(store: Arc<dyn MessageStore>, hub: ConnectionHub, persist_timeout: Duration) -> Self {
        Self {
            store,
            hub,
            persist_timeout,
        }
    }

    pub async fn react(
        &self,
        message_id: Uuid,
        user_id: &str,
        emoji: &str,
        chat_id: &str,
    ) -> Result<ReactionResult, ChatError> {
        validate_user_id(user_id)?;
        validate_emoji(emoji)?;

        let stored = bounded(self.persist_timeout, "find", self.store.find(message_id))
            .await?
            .ok_or(ChatError::NotFound(message_id))?;
        if stored.chat_id.as_str() != chat_id {
            return Err(ChatError::ChatMismatch {
                message_id,
                claimed: chat_id.to_string(),
                actual: stored.chat_id.to_string(),
            });
        }
        let chat_id = stored.chat_id;
        if !chat_id.includes(user_id) {
            return Err(ChatError::NotParticipant {
                user_id: user_id.to_string(),
                chat_id: chat_id.to_string(),
            });
        }

        let outcome = bounded(
            self.persist_timeout,
            "add_reaction",
            self.store.add_reaction(message_id, user_id, emoji),
        )
        .await?;

        if !outcome.accepted {
            debug!("{} already reacted {} to {}", user_id, emoji, message_id);
            return Ok(ReactionResult::Duplicate);
        }

        info!("{} reacted {} to {}", user_id, emoji, message_id);

        let (a, b) = chat_id.participants();
        self.hub
            .emit_to_users(
                &[a, b],
                GatewayEvent::ReactionUpdate {
                    message_id,
                    user_id: user_id.to_string(),
                    emoji: emoji.to_string(),
                    chat_id: chat_id.clone(),
                },
            )
            .await;

        Ok(ReactionResult::Added(Reaction {
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
        }))
    }
}

fn validate_emoji(emoji: &str) -> Result<(), ChatError> {
    if emoji.trim().is_empty() {
        return Err(ChatError::InvalidContent("emoji is empty".into()));
    }
    if emoji.len() > MAX_EMOJI_BYTES {
        return Err(ChatError::InvalidContent(format!(
            "emoji is {} bytes, limit is {}",
            emoji.len(),
            MAX_EMOJI_BYTES
        )));
    }
    Ok(())
}

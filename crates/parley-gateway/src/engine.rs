use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use parley_db::MessageStore;
use parley_types::{ChatId, GatewayCommand, GatewayEvent};

use crate::error::ChatError;
use crate::hub::ConnectionHub;
use crate::pipeline::{DeliveryPipeline, StatusPolicy};
use crate::presence::ConnectionId;
use crate::reactions::{ReactionAggregator, ReactionResult};
use crate::typing::TypingRelay;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on any single store call made while handling a command
    pub persist_timeout: Duration,
    pub status_policy: StatusPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_secs(5),
            status_policy: StatusPolicy::ForwardOnly,
        }
    }
}

/// Routes decoded gateway commands to the component that owns them.
///
/// A connection must `join` before anything else, and every later command
/// must name the identity it joined as.
#[derive(Clone)]
pub struct ChatEngine {
    hub: ConnectionHub,
    pipeline: DeliveryPipeline,
    reactions: ReactionAggregator,
    typing: TypingRelay,
}

impl ChatEngine {
    pub fn new(store: Arc<dyn MessageStore>, hub: ConnectionHub, config: EngineConfig) -> Self {
        let pipeline = DeliveryPipeline::new(
            store.clone(),
            hub.clone(),
            config.status_policy,
            config.persist_timeout,
        );
        let reactions = ReactionAggregator::new(store, hub.clone(), config.persist_timeout);
        let typing = TypingRelay::new(hub.clone());
        Self {
            hub,
            pipeline,
            reactions,
            typing,
        }
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    /// Handle one command from `handle`. Returns the direct reply for that
    /// connection, if any. Failures are turned into an `error` reply.
    pub async fn handle_command(
        &self,
        handle: ConnectionId,
        command: GatewayCommand,
    ) -> Option<GatewayEvent> {
        let name = command.name();
        match self.dispatch(handle, command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} from connection {} failed: {}", name, handle, e);
                Some(e.to_event())
            }
        }
    }

    async fn dispatch(
        &self,
        handle: ConnectionId,
        command: GatewayCommand,
    ) -> Result<Option<GatewayEvent>, ChatError> {
        match command {
            GatewayCommand::Join { user_id } => {
                let online = self.hub.join_channel(&user_id, handle).await?;
                Ok(Some(GatewayEvent::Ready { user_id, online }))
            }

            GatewayCommand::SendMessage {
                sender_id,
                receiver_id,
                content,
                reply_to,
            } => {
                self.bound_as(handle, &sender_id).await?;
                self.pipeline
                    .submit(&sender_id, &receiver_id, content, reply_to)
                    .await?;
                Ok(None)
            }

            GatewayCommand::MessageStatus {
                message_id,
                status,
                chat_id,
            } => {
                let user_id = self.bound_user(handle).await?;
                // An unparseable id never matches a stored chat; mark_status
                // reports it as a mismatch
                if let Ok(chat) = ChatId::parse(&chat_id) {
                    if !chat.includes(&user_id) {
                        return Err(ChatError::NotParticipant { user_id, chat_id });
                    }
                }
                self.pipeline.mark_status(message_id, status, &chat_id).await?;
                Ok(None)
            }

            GatewayCommand::ReactionUpdate {
                message_id,
                user_id,
                emoji,
                chat_id,
            } => {
                self.bound_as(handle, &user_id).await?;
                match self
                    .reactions
                    .react(message_id, &user_id, &emoji, &chat_id)
                    .await?
                {
                    ReactionResult::Added(_) => Ok(None),
                    ReactionResult::Duplicate => Ok(Some(GatewayEvent::ReactionDuplicate {
                        message_id,
                        user_id,
                        emoji,
                        chat_id: ChatId::parse(&chat_id)?,
                    })),
                }
            }

            GatewayCommand::Typing { chat_id, user_id } => {
                self.relay_typing(handle, &chat_id, &user_id, true).await;
                Ok(None)
            }

            GatewayCommand::StopTyping { chat_id, user_id } => {
                self.relay_typing(handle, &chat_id, &user_id, false).await;
                Ok(None)
            }
        }
    }

    /// Typing indicators are best-effort: any problem drops them without a
    /// reply.
    async fn relay_typing(&self, handle: ConnectionId, chat_id: &str, user_id: &str, started: bool) {
        if let Err(e) = self.bound_as(handle, user_id).await {
            debug!("typing from connection {} dropped: {}", handle, e);
            return;
        }
        let relayed = if started {
            self.typing.notify_typing(chat_id, user_id).await
        } else {
            self.typing.notify_stop_typing(chat_id, user_id).await
        };
        if let Err(e) = relayed {
            debug!("typing from {} dropped: {}", user_id, e);
        }
    }

    async fn bound_user(&self, handle: ConnectionId) -> Result<String, ChatError> {
        self.hub
            .presence()
            .user_of(handle)
            .await
            .ok_or(ChatError::NotJoined)
    }

    async fn bound_as(&self, handle: ConnectionId, claimed: &str) -> Result<(), ChatError> {
        let bound = self.bound_user(handle).await?;
        if bound != claimed {
            return Err(ChatError::Impersonation {
                bound,
                claimed: claimed.to_string(),
            });
        }
        Ok(())
    }
}

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_db::{MessageStore, NewMessage, StatusUpdate, StoreError};
use parley_types::models::MAX_CONTENT_CHARS;
use parley_types::{ChatId, GatewayEvent, Message, MessageStatus};

use crate::error::ChatError;
use crate::hub::ConnectionHub;

/// How client status acknowledgements are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// A write that would move a message backwards is refused
    #[default]
    ForwardOnly,
    /// Any write is applied as-is
    Permissive,
}

impl FromStr for StatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward-only" => Ok(Self::ForwardOnly),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!(
                "unknown status policy '{}' (expected forward-only or permissive)",
                other
            )),
        }
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// The message as it stands after delivery, status included
    pub message: Message,
    /// Connections the `receiveMessage` event was handed to
    pub recipients: usize,
}

/// Await a store call, bounded by `limit`. Both a store failure and a timeout
/// surface as `ChatError::Persistence`, except `NotFound`.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &str, call: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ChatError::from),
        Err(_) => Err(ChatError::Persistence(format!(
            "{} timed out after {}ms",
            op,
            limit.as_millis()
        ))),
    }
}

pub(crate) fn validate_content(content: &str) -> Result<(), ChatError> {
    if content.trim().is_empty() {
        return Err(ChatError::InvalidContent("message content is empty".into()));
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(ChatError::InvalidContent(format!(
            "message content is {} characters, limit is {}",
            chars, MAX_CONTENT_CHARS
        )));
    }
    Ok(())
}

/// Persists messages, fans them out to both participants and drives their
/// status lifecycle.
#[derive(Clone)]
pub struct DeliveryPipeline {
    store: Arc<dyn MessageStore>,
    hub: ConnectionHub,
    policy: StatusPolicy,
    persist_timeout: Duration,
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        hub: ConnectionHub,
        policy: StatusPolicy,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            policy,
            persist_timeout,
        }
    }

    /// Persist a message and deliver it to both participants. If the receiver
    /// is online the message is immediately marked delivered and both sides
    /// are told. Nothing is emitted if persistence fails.
    pub async fn submit(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: String,
        reply_to: Option<Uuid>,
    ) -> Result<DeliveryResult, ChatError> {
        let chat_id = ChatId::derive(sender_id, receiver_id)?;
        validate_content(&content)?;

        let new = NewMessage {
            chat_id: chat_id.clone(),
            sender_id: sender_id.to_string(),
            content,
            reply_to,
        };
        let mut message = bounded(self.persist_timeout, "create", self.store.create(new))
            .await
            .inspect_err(|e| warn!("Failed to persist message in {}: {}", chat_id, e))?;

        debug!("message {} stored in {}", message.id, chat_id);

        let participants = [sender_id, receiver_id];
        let recipients = self
            .hub
            .emit_to_users(&participants, GatewayEvent::ReceiveMessage(message.clone()))
            .await;

        if self.hub.presence().is_online(receiver_id).await {
            match bounded(
                self.persist_timeout,
                "advance_status",
                self.store.advance_status(message.id, MessageStatus::Delivered),
            )
            .await
            {
                Ok(StatusUpdate::Applied) => {
                    message.status = MessageStatus::Delivered;
                    self.hub
                        .emit_to_users(
                            &participants,
                            GatewayEvent::MessageStatusUpdate {
                                message_id: message.id,
                                status: MessageStatus::Delivered,
                                chat_id: chat_id.clone(),
                            },
                        )
                        .await;
                }
                // The receiver already acknowledged further
                Ok(StatusUpdate::Rejected { current }) => message.status = current,
                Err(e) => warn!("Failed to mark {} delivered: {}", message.id, e),
            }
        }

        Ok(DeliveryResult {
            message,
            recipients,
        })
    }

    /// Apply a client acknowledgement and tell both participants. Any
    /// `chat_id` other than the message's own, malformed or reversed ones
    /// included, is a mismatch.
    pub async fn mark_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
        chat_id: &str,
    ) -> Result<(), ChatError> {
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

        match self.policy {
            StatusPolicy::ForwardOnly => {
                let update = bounded(
                    self.persist_timeout,
                    "advance_status",
                    self.store.advance_status(message_id, status),
                )
                .await?;
                if let StatusUpdate::Rejected { current } = update {
                    return Err(ChatError::StatusRegression {
                        message_id,
                        current,
                        requested: status,
                    });
                }
            }
            StatusPolicy::Permissive => {
                bounded(
                    self.persist_timeout,
                    "set_status",
                    self.store.set_status(message_id, status),
                )
                .await?;
            }
        }

        info!("message {} marked {}", message_id, status);

        let (a, b) = chat_id.participants();
        self.hub
            .emit_to_users(
                &[a, b],
                GatewayEvent::MessageStatusUpdate {
                    message_id,
                    status,
                    chat_id: chat_id.clone(),
                },
            )
            .await;
        Ok(())
    }
}

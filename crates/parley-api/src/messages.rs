use axum::{
    Json,
    extract::{Path, State},
};
use tracing::debug;

use parley_types::api::MessageListResponse;
use parley_types::{ChatId, validate_user_id};

use crate::error::ApiError;
use crate::state::AppState;

/// Full history of one chat, oldest first.
pub async fn chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let chat_id = ChatId::parse(&chat_id)?;
    let messages = state.read(state.store.list_by_chat(&chat_id)).await?;
    debug!("{} messages in {}", messages.len(), chat_id);
    Ok(Json(messages.into()))
}

/// Every message of every chat the user takes part in, oldest first.
pub async fn user_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    validate_user_id(&user_id)?;
    let messages = state.read(state.store.list_by_participant(&user_id)).await?;
    debug!("{} messages for {}", messages.len(), user_id);
    Ok(Json(messages.into()))
}

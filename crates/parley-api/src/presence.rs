use axum::{
    Json,
    extract::{Path, State},
};

use parley_types::{UserPresence, validate_user_id};

use crate::error::ApiError;
use crate::state::AppState;

/// Presence of one user. Users never seen are reported offline with no
/// last-seen time.
pub async fn user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPresence>, ApiError> {
    validate_user_id(&user_id)?;
    Ok(Json(state.hub.presence().presence_of(&user_id).await))
}

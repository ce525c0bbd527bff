/// Read-only HTTP surface over message history and presence.

pub mod error;
pub mod messages;
pub mod presence;
pub mod state;

use axum::{Router, routing::get};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// History and presence routes, state applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(state::health))
        .route("/chats/{chat_id}/messages", get(messages::chat_messages))
        .route("/users/{user_id}/messages", get(messages::user_messages))
        .route("/users/{user_id}/presence", get(presence::user_presence))
        .with_state(state)
}

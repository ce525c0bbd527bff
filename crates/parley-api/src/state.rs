use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use parley_db::{MessageStore, StoreError};
use parley_gateway::ConnectionHub;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<dyn MessageStore>,
    pub hub: ConnectionHub,
    /// Upper bound on one store read
    pub read_timeout: Duration,
}

impl AppStateInner {
    pub(crate) async fn read<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.read_timeout, call)
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::from)
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.hub.connection_count().await,
    }))
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::{AppState, AppStateInner};
use parley_db::{Database, MemoryStore, MessageStore, SqliteStore};
use parley_gateway::{ChatEngine, ConnectionHub, connection};

use crate::config::{ServerConfig, StoreBackend};

#[derive(Clone)]
struct ServerState {
    engine: ChatEngine,
    heartbeat: Duration,
}

/// The assembled application: the router plus the hub it feeds, kept so the
/// caller can drain connections on shutdown.
pub struct App {
    pub router: Router,
    pub hub: ConnectionHub,
}

pub fn open_store(backend: &StoreBackend) -> Result<Arc<dyn MessageStore>> {
    match backend {
        StoreBackend::Sqlite { path } => {
            info!("Opening SQLite store at {}", path.display());
            Ok(Arc::new(SqliteStore::new(Database::open(path)?)))
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; history will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub fn build_app(store: Arc<dyn MessageStore>, config: &ServerConfig) -> App {
    let hub = ConnectionHub::new();
    let engine = ChatEngine::new(store.clone(), hub.clone(), config.engine());

    let api_state: AppState = Arc::new(AppStateInner {
        store,
        hub: hub.clone(),
        read_timeout: config.persist_timeout,
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(ServerState {
            engine,
            heartbeat: config.heartbeat,
        });

    let router = Router::new()
        .merge(parley_api::router(api_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    App { router, hub }
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.engine, state.heartbeat))
}

/// Resolves on Ctrl-C (or SIGTERM on unix), after closing every live
/// connection.
pub async fn shutdown_signal(hub: ConnectionHub) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown requested");
    let drained = hub.drain().await;
    info!("Closed {} gateway connections", drained);
}

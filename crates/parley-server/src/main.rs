use std::net::SocketAddr;

use tracing::info;

use parley_server::{App, ServerConfig, build_app, open_store, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=debug,parley_gateway=debug,parley_api=debug,parley_db=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let store = open_store(&config.store)?;
    let App { router, hub } = build_app(store, &config);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!(
        "Parley server listening on {} (status policy {:?}, heartbeat {}s)",
        addr,
        config.status_policy,
        config.heartbeat.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    info!("Parley server stopped");
    Ok(())
}

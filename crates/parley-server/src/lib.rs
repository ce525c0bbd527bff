/// Parley server: configuration and application assembly. The `parley`
/// binary is a thin wrapper around this.

pub mod app;
pub mod config;

pub use app::{App, build_app, open_store, shutdown_signal};
pub use config::{ServerConfig, StoreBackend};

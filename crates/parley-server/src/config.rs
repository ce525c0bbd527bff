use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use parley_gateway::{EngineConfig, StatusPolicy};

/// Where messages are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite { path: PathBuf },
    /// Process-local; history is lost on restart
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub persist_timeout: Duration,
    pub heartbeat: Duration,
    pub status_policy: StatusPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            store: StoreBackend::Sqlite {
                path: PathBuf::from("parley.db"),
            },
            persist_timeout: Duration::from_millis(5000),
            heartbeat: Duration::from_secs(15),
            status_policy: StatusPolicy::ForwardOnly,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys keep their defaults;
    /// set but unparsable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("PARLEY_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PARLEY_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("PARLEY_PORT '{}' is not a port number", port))?;
        }

        let db_path = lookup("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into());
        config.store = match lookup("PARLEY_STORE").as_deref() {
            None | Some("sqlite") => StoreBackend::Sqlite {
                path: PathBuf::from(db_path),
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("PARLEY_STORE '{}' must be sqlite or memory", other),
        };

        if let Some(ms) = lookup("PARLEY_PERSIST_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("PARLEY_PERSIST_TIMEOUT_MS '{}' is not a number", ms))?;
            if ms == 0 {
                bail!("PARLEY_PERSIST_TIMEOUT_MS must be positive");
            }
            config.persist_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = lookup("PARLEY_HEARTBEAT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("PARLEY_HEARTBEAT_SECS '{}' is not a number", secs))?;
            if secs == 0 {
                bail!("PARLEY_HEARTBEAT_SECS must be positive");
            }
            config.heartbeat = Duration::from_secs(secs);
        }

        if let Some(policy) = lookup("PARLEY_STATUS_POLICY") {
            config.status_policy = policy.parse().map_err(anyhow::Error::msg)?;
        }

        Ok(config)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            persist_timeout: self.persist_timeout,
            status_policy: self.status_policy,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

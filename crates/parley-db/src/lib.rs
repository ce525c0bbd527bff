pub mod gate;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod sqlite;
pub mod store;

use anyhow::{Result, bail};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use gate::WriteGate;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{MessageStore, NewMessage, ReactionOutcome, StatusUpdate, StoreError};

/// SQLite handle. One connection behind a mutex: every write is serialized,
/// which is what makes the duplicate-reaction and status checks atomic.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, gone when dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }

    /// Run `f` in a transaction that only commits if `gate` is still live.
    /// A gate abandoned before the connection is free skips the write; one
    /// abandoned while `f` runs rolls it back.
    pub fn write<F, T>(&self, gate: &WriteGate, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.with_conn_mut(|conn| {
            if !gate.begin() {
                bail!("write abandoned before it started");
            }
            let tx = conn.transaction()?;
            let out = f(&tx)?;
            if !gate.commit() {
                bail!("write abandoned, rolled back");
            }
            tx.commit()?;
            Ok(out)
        })
    }
}

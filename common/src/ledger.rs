//! Contador de reintentos persistido por episodio de fallo.
//!
//! Sobrevive a reinicios del proceso y a invocaciones solapadas: el reclamo
//! de un reintento es un único upsert atómico en `SQLite`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::error::LedgerError;

const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS retry_episodes (
    episode TEXT PRIMARY KEY NOT NULL,
    retries INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
";

pub trait RetryLedger {
    /// Reintentos ya reclamados para el episodio (0 si no hay registro).
    fn retries_for(&self, episode: &str) -> Result<u32, LedgerError>;

    /// Reclama un reintento si quedan menos de `limit`. Devuelve `true` si se
    /// reclamó (y el contador ya quedó incrementado), `false` si el
    /// presupuesto está agotado.
    fn try_claim(&self, episode: &str, limit: u32) -> Result<bool, LedgerError>;

    /// Devuelve un reintento reclamado que no llegó a enviarse. Nunca baja
    /// de cero.
    fn release(&self, episode: &str) -> Result<(), LedgerError>;
}

pub struct SqliteRetryLedger {
    conn: Mutex<Connection>,
}

impl SqliteRetryLedger {
    /// Abre o crea la base en `path`, creando el directorio si falta.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl RetryLedger for SqliteRetryLedger {
    fn retries_for(&self, episode: &str) -> Result<u32, LedgerError> {
        let conn = self.lock_conn()?;
        let retries: Option<u32> = conn
            .query_row(
                "SELECT retries FROM retry_episodes WHERE episode = ?1",
                rusqlite::params![episode],
                |row| row.get(0),
            )
            .optional()?;
        Ok(retries.unwrap_or(0))
    }

    fn try_claim(&self, episode: &str, limit: u32) -> Result<bool, LedgerError> {
        if limit == 0 {
            return Ok(false);
        }
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "INSERT INTO retry_episodes (episode, retries, updated_at) \
             VALUES (?1, 1, ?2) \
             ON CONFLICT(episode) \
             DO UPDATE SET retries = retries + 1, updated_at = ?2 \
             WHERE retries < ?3",
            rusqlite::params![episode, now, limit],
        )?;
        Ok(changed == 1)
    }

    fn release(&self, episode: &str) -> Result<(), LedgerError> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE retry_episodes SET retries = retries - 1, updated_at = ?2 \
             WHERE episode = ?1 AND retries > 0",
            rusqlite::params![episode, now],
        )?;
        Ok(())
    }
}

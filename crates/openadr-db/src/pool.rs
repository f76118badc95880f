//! Pooled SQLite connections.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Shared pool handed to request handlers and background work.
pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite tunables applied to every pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Upper bound on open connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens a pool over `db_path` with WAL journaling and a busy timeout.
///
/// `:memory:` is accepted for tests; note that each pooled in-memory
/// connection sees its own database, so in-memory pools should be sized 1.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if no connection can be established or WAL
/// mode is refused.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases answer "memory"; anything else means WAL
            // was not accepted.
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if mode != "wal" && mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("journal_mode WAL refused, got {mode}")),
                ));
            }
            conn.busy_timeout(std::time::Duration::from_millis(settings.busy_timeout_ms))
        });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;
    tracing::debug!(
        path = db_path,
        max_size = settings.pool_max_size,
        "database pool ready"
    );
    Ok(pool)
}

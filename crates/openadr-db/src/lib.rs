//! SQLite persistence for the OpenADR overlay.
//!
//! Provides the connection pool (via `r2d2`) used by the overlay host and the
//! embedded, versioned schema migrations for the event index. The event
//! index is a single table keyed by `(txid, output_index)`; everything the
//! store needs is created here.
//!
//! SQLite runs in WAL mode so lookups can proceed while an ingestion
//! callback writes.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};

//! Embedded, versioned schema migrations.
//!
//! Each migration is applied at most once and recorded in
//! `_openadr_migrations`. A migration and its tracking row commit together,
//! so a failed migration leaves no partial schema behind.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Applied in order. Append only; never edit a released migration.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_events",
        sql: include_str!("migrations/000_events.sql"),
    },
    Migration {
        name: "001_events_active_index",
        sql: include_str!("migrations/001_events_active_index.sql"),
    },
];

/// Errors that can occur while migrating the schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    #[error("failed to read migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every pending migration and returns how many ran.
///
/// # Errors
///
/// Returns `MigrationError` if a migration or the tracking table fails.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply(conn, MIGRATIONS)
}

fn apply(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    let failed = |name: &str| {
        let name = name.to_string();
        move |source| MigrationError::ExecutionFailed { name, source }
    };

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _openadr_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(failed("_openadr_migrations"))?;

    let mut applied = 0;
    for migration in migrations {
        let done: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM _openadr_migrations WHERE name = ?1)",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;
        if done {
            tracing::debug!(migration = migration.name, "migration already applied");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");
        let tx = conn
            .unchecked_transaction()
            .map_err(failed(migration.name))?;
        tx.execute_batch(migration.sql)
            .map_err(failed(migration.name))?;
        tx.execute(
            "INSERT INTO _openadr_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed(migration.name))?;
        tx.commit().map_err(failed(migration.name))?;
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn fresh_database_gets_every_migration() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, MIGRATIONS.len());
        assert!(table_exists(&conn, "openadr_events"));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("first run should succeed");
        assert_eq!(run_migrations(&conn).expect("second run should succeed"), 0);
    }

    #[test]
    fn events_table_enforces_positive_duration() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");
        let result = conn.execute(
            "INSERT INTO openadr_events
                (txid, output_index, event_type, program_id, start_time, duration, payload)
             VALUES ('aa', 0, 'SIMPLE', 'p', 0, 0, x'')",
            [],
        );
        assert!(result.is_err(), "zero duration must violate the CHECK constraint");
    }

    #[test]
    fn failed_migration_rolls_back() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let broken = [Migration {
            name: "900_broken",
            sql: "CREATE TABLE rollback_check (id INTEGER); SELECT * FROM missing_table;",
        }];

        let err = apply(&conn, &broken).expect_err("broken migration should fail");
        assert!(matches!(err, MigrationError::ExecutionFailed { ref name, .. } if name == "900_broken"));
        assert!(!table_exists(&conn, "rollback_check"));

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _openadr_migrations", [], |row| row.get(0))
            .expect("should count tracking rows");
        assert_eq!(recorded, 0);
    }
}

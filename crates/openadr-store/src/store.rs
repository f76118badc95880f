//! Persistence operations for the event index.
//!
//! Writes go through [`insert_event`] and [`set_status`]; both are safe to
//! repeat for the same key, which is what lets ingestion callbacks run
//! without any locking beyond SQLite's own.

use openadr_types::{EventStatus, EventType, OutpointKey, Txid, UnixSeconds};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::record::{EventFilter, EventRecord, NewEvent};

/// Indexes a new event output with status `active`.
///
/// Returns `false` without touching the existing row if the key is already
/// indexed, whatever its status.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn insert_event(conn: &Connection, event: &NewEvent) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT INTO openadr_events
            (txid, output_index, event_type, program_id, start_time, duration, payload, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active')
         ON CONFLICT (txid, output_index) DO NOTHING",
        params![
            event.key.txid.to_hex(),
            event.key.output_index,
            event.event_type.as_str(),
            event.program_id,
            event.start_time,
            event.duration,
            event.payload,
        ],
    )?;

    if inserted == 0 {
        tracing::debug!(key = %event.key, "event already indexed, skipping");
    }
    Ok(inserted > 0)
}

/// Moves an active event to a terminal status.
///
/// Returns `false` if the key is not indexed or the record is already
/// terminal; neither is an error, since ledger callbacks routinely arrive for
/// outputs that were never OpenADR events.
///
/// # Errors
///
/// Returns `StoreError::InvalidTransition` for `EventStatus::Active` and
/// `StoreError::Database` on SQL failure.
pub fn set_status(
    conn: &Connection,
    key: &OutpointKey,
    status: EventStatus,
) -> Result<bool, StoreError> {
    if !status.is_terminal() {
        return Err(StoreError::InvalidTransition(status));
    }

    let updated = conn.execute(
        "UPDATE openadr_events SET status = ?3
         WHERE txid = ?1 AND output_index = ?2 AND status = 'active'",
        params![key.txid.to_hex(), key.output_index, status.as_str()],
    )?;

    if updated == 0 {
        tracing::debug!(%key, %status, "no active event for status update");
    }
    Ok(updated > 0)
}

/// Returns every indexed key in indexing order.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn list_all(conn: &Connection) -> Result<Vec<OutpointKey>, StoreError> {
    let mut stmt = conn.prepare("SELECT txid, output_index FROM openadr_events ORDER BY rowid ASC")?;
    let rows = stmt.query_map([], map_row_to_key)?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row?);
    }
    Ok(keys)
}

/// Returns the keys of events that are active-in-time at `now`, in indexing
/// order, narrowed by `filter`.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn list_active(
    conn: &Connection,
    now: UnixSeconds,
    filter: &EventFilter,
) -> Result<Vec<OutpointKey>, StoreError> {
    let mut clauses = vec![
        "status = 'active'".to_string(),
        "start_time <= ?1".to_string(),
        "start_time + duration > ?1".to_string(),
    ];
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now)];

    if let Some(ref program_id) = filter.program_id {
        values.push(Box::new(program_id.clone()));
        clauses.push(format!("program_id = ?{}", values.len()));
    }
    if let Some(ref event_type) = filter.event_type {
        values.push(Box::new(event_type.as_str().to_string()));
        clauses.push(format!("event_type = ?{}", values.len()));
    }

    let sql = format!(
        "SELECT txid, output_index FROM openadr_events WHERE {} ORDER BY rowid ASC",
        clauses.join(" AND ")
    );
    let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| &**v).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(refs.as_slice(), map_row_to_key)?;

    let mut keys = Vec::new();
    for row in rows {
        keys.push(row?);
    }
    Ok(keys)
}

/// Fetches the full record for `key`, if indexed.
///
/// # Errors
///
/// Returns `StoreError::Database` on SQL failure.
pub fn get_event(conn: &Connection, key: &OutpointKey) -> Result<Option<EventRecord>, StoreError> {
    let record = conn
        .query_row(
            "SELECT txid, output_index, event_type, program_id, start_time, duration,
                    payload, status, created_at
             FROM openadr_events WHERE txid = ?1 AND output_index = ?2",
            params![key.txid.to_hex(), key.output_index],
            map_row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn parse_txid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Txid> {
    let hex: String = row.get(idx)?;
    hex.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_row_to_key(row: &Row<'_>) -> rusqlite::Result<OutpointKey> {
    Ok(OutpointKey::new(parse_txid(row, 0)?, row.get(1)?))
}

fn map_row_to_record(row: &Row<'_>) -> rusqlite::Result<EventRecord> {
    let status: String = row.get(7)?;
    let status = status
        .parse::<EventStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    Ok(EventRecord {
        key: map_row_to_key(row)?,
        event_type: EventType::from(row.get::<_, String>(2)?),
        program_id: row.get(3)?,
        start_time: row.get(4)?,
        duration: row.get(5)?,
        payload: row.get(6)?,
        status,
        created_at: row.get(8)?,
    })
}

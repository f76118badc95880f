//! Error types for the event index.

use openadr_types::EventStatus;

/// Errors that can occur during event index operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("event store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested status change can never happen.
    #[error("cannot move an event to status '{0}'")]
    InvalidTransition(EventStatus),
}

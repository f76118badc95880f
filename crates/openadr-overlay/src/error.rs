//! Error types for the lookup service.

use openadr_store::StoreError;

/// Errors returned by [`LookupService`](crate::LookupService).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The question named a service other than `ls_openADR`.
    #[error("lookup service not supported: {0}")]
    UnsupportedService(String),

    /// The query matched none of the supported shapes.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// The event index failed.
    #[error("event store error: {0}")]
    Store(#[from] StoreError),
}

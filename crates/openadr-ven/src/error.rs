//! Error types for the VEN client.

use openadr_contract::{CodecError, PayloadError, TransactionError};
use openadr_types::OutpointKey;
use thiserror::Error;

/// Failure talking to an external HTTP collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the failure may succeed on a later attempt: connection
    /// failures, timeouts and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Errors from the client lifecycle and poll cycle.
#[derive(Debug, Error)]
pub enum VenError {
    #[error("client is already initialized")]
    AlreadyInitialized,

    #[error("client has been shut down")]
    Terminated,

    #[error("registration with the VTN failed: {0}")]
    Registration(#[source] TransportError),

    #[error("lookup query failed: {0}")]
    Lookup(#[source] TransportError),

    #[error("ledger request failed: {0}")]
    Ledger(#[source] TransportError),

    #[error("ledger transaction is malformed: {0}")]
    Transaction(#[from] TransactionError),

    #[error("transaction has no output {0}")]
    OutputMissing(OutpointKey),

    #[error("output does not hold an OpenADR event: {0}")]
    Codec(#[from] CodecError),

    #[error("event payload cannot carry reports: {0}")]
    Payload(#[from] PayloadError),
}

/// Errors from report emission.
///
/// After a `Submission` failure nothing has changed anywhere. After
/// `OnChainPending` the VTN holds the report and only the ledger record is
/// outstanding.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The VTN rejected or never received the report.
    #[error("report submission failed: {0}")]
    Submission(#[source] TransportError),

    /// The report reached the VTN but the ledger update failed; it has been
    /// queued for [`VenClient::reconcile_pending`](crate::VenClient::reconcile_pending).
    #[error("report {report_id} accepted by VTN, ledger update pending: {source}")]
    OnChainPending {
        report_id: String,
        #[source]
        source: VenError,
    },

    /// The event payload can never carry a report log; not queued.
    #[error("report {report_id} accepted by VTN, event payload rejects reports: {source}")]
    PayloadRejected {
        report_id: String,
        #[source]
        source: PayloadError,
    },

    /// The report value cannot be sent.
    #[error("invalid report value: {0}")]
    InvalidValue(String),

    #[error("client has been shut down")]
    Terminated,
}

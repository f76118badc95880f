//! Error types for contract encoding, payloads, and transactions.

/// Errors produced when a locking script does not hold valid OpenADR state.
///
/// Most ledger outputs are not OpenADR outputs at all, so callers treat
/// these as "skip this output", not as failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("script does not start with the contract code")]
    PrefixMismatch,

    #[error("script ended unexpectedly")]
    Truncated,

    #[error("unexpected opcode 0x{0:02x} in state section")]
    UnexpectedOpcode(u8),

    #[error("push of {0} bytes does not use the shortest encoding")]
    NonCanonicalPush(usize),

    #[error("script number is not minimally encoded")]
    NonMinimalNumber,

    #[error("script number does not fit in 64 bits")]
    NumberOverflow,

    #[error("state length footer says {declared} bytes, found {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unsupported state version {0}")]
    UnsupportedVersion(u8),

    #[error("unexpected data after the last state field")]
    TrailingData,

    #[error("field '{0}' is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("invalid field value: {0}")]
    InvalidField(String),
}

/// Errors produced when raw transaction bytes cannot be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction truncated at byte {0}")]
    Truncated(usize),

    #[error("{0} unexpected bytes after lock time")]
    TrailingData(usize),

    #[error("length prefix at byte {0} does not use the shortest encoding")]
    NonCanonicalVarint(usize),

    #[error("transaction hex is invalid: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Errors produced when an event payload cannot carry a report log.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload 'reports' field is not an array")]
    ReportsNotArray,
}

/// Errors produced when loading a contract artifact.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read contract artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse contract artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("contract code is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("contract code is empty")]
    EmptyCode,
}

//! Shared types, identifiers, and constants for the OpenADR overlay.
//!
//! This crate provides the foundational types used across all OpenADR
//! crates: ledger outpoint identifiers, event type and status enums, report
//! log entries, and the overlay topic/service names.
//!
//! No crate in the workspace depends on anything *except* `openadr-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod outpoint;
mod report;

pub use outpoint::{OutpointKey, ParseTxidError, Txid};
pub use report::ReportEntry;

/// Topic name under which the admission filter admits OpenADR outputs.
///
/// Ingestion callbacks carrying any other topic are ignored.
pub const TOPIC_MANAGER_NAME: &str = "tm_openADR";

/// Service name the lookup service answers to.
pub const LOOKUP_SERVICE_NAME: &str = "ls_openADR";

/// Unix time in whole seconds.
pub type UnixSeconds = i64;

/// OpenADR event types.
///
/// The set is open: types this node does not understand are preserved
/// verbatim in [`EventType::Other`] so they can be indexed and forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Simple signal carrying a severity level.
    Simple,
    /// Price signal.
    Price,
    /// Any other event type string.
    Other(String),
}

impl EventType {
    /// Returns the wire label for this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Price => "PRICE",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "SIMPLE" => Self::Simple,
            "PRICE" => Self::Price,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SIMPLE" => Self::Simple,
            "PRICE" => Self::Price,
            _ => Self::Other(s),
        }
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        match t {
            EventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an indexed event output.
///
/// Transitions are one-way: `Active` may become `Spent` or `Deleted`, and
/// both of those are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Output is unspent and indexed.
    Active,
    /// Output was consumed by a later transaction.
    Spent,
    /// Output was removed from the overlay (e.g. the transaction was evicted).
    Deleted,
}

impl EventStatus {
    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Spent => "spent",
            Self::Deleted => "deleted",
        }
    }

    /// Whether no further transition is possible from this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = ParseEventStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "spent" => Ok(Self::Spent),
            "deleted" => Ok(Self::Deleted),
            _ => Err(ParseEventStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event status string.
#[derive(Debug, Clone, Error)]
#[error("unknown event status: {0}")]
pub struct ParseEventStatusError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_known_labels() {
        assert_eq!(EventType::from("SIMPLE"), EventType::Simple);
        assert_eq!(EventType::from("PRICE"), EventType::Price);
        assert_eq!(EventType::Simple.as_str(), "SIMPLE");
        assert_eq!(EventType::Price.to_string(), "PRICE");
    }

    #[test]
    fn event_type_preserves_unknown_labels() {
        let t = EventType::from("LOAD_DISPATCH");
        assert_eq!(t, EventType::Other("LOAD_DISPATCH".to_string()));
        assert_eq!(t.as_str(), "LOAD_DISPATCH");
        assert_eq!(String::from(t), "LOAD_DISPATCH");
    }

    #[test]
    fn event_type_serde_uses_wire_label() {
        let json = serde_json::to_string(&EventType::Simple).unwrap();
        assert_eq!(json, "\"SIMPLE\"");
        let back: EventType = serde_json::from_str("\"CUSTOM\"").unwrap();
        assert_eq!(back, EventType::Other("CUSTOM".to_string()));
    }

    #[test]
    fn event_status_round_trip() {
        for status in [EventStatus::Active, EventStatus::Spent, EventStatus::Deleted] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("expired".parse::<EventStatus>().is_err());
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!EventStatus::Active.is_terminal());
        assert!(EventStatus::Spent.is_terminal());
        assert!(EventStatus::Deleted.is_terminal());
    }
}

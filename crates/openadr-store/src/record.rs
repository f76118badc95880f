//! Event index record types.

use openadr_types::{EventStatus, EventType, OutpointKey, UnixSeconds};
use serde::Serialize;

/// Fields of a newly admitted event output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub key: OutpointKey,
    pub event_type: EventType,
    pub program_id: String,
    pub start_time: UnixSeconds,
    pub duration: i64,
    pub payload: Vec<u8>,
}

/// A single row from the `openadr_events` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(flatten)]
    pub key: OutpointKey,
    pub event_type: EventType,
    #[serde(rename = "programID")]
    pub program_id: String,
    pub start_time: UnixSeconds,
    pub duration: i64,
    /// Payload as indexed at admission time.
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub status: EventStatus,
    /// When the record was indexed (`YYYY-MM-DD HH:MM:SS`, UTC).
    pub created_at: String,
}

impl EventRecord {
    /// Whether the record is status-active and `now` lies in its window.
    pub fn is_active_at(&self, now: UnixSeconds) -> bool {
        self.status == EventStatus::Active
            && self.start_time <= now
            && now < self.start_time.saturating_add(self.duration)
    }
}

/// Optional narrowing for [`list_active`](crate::list_active).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub program_id: Option<String>,
    pub event_type: Option<EventType>,
}

impl EventFilter {
    /// Filter matching a single program.
    pub fn for_program(program_id: impl Into<String>) -> Self {
        Self {
            program_id: Some(program_id.into()),
            event_type: None,
        }
    }
}

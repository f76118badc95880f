//! Event views and the reports they trigger.

use openadr_contract::{ContractState, EventPayload};
use openadr_types::{EventType, OutpointKey, UnixSeconds};

/// An OpenADR event as seen by a VEN.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub key: OutpointKey,
    pub event_type: EventType,
    pub program_id: String,
    pub start_time: UnixSeconds,
    pub duration: i64,
    pub payload: EventPayload,
}

impl Event {
    pub fn from_state(key: OutpointKey, state: &ContractState) -> Self {
        Self {
            key,
            event_type: state.event_type.clone(),
            program_id: state.program_id.clone(),
            start_time: state.start_time,
            duration: state.duration,
            payload: state.typed_payload(),
        }
    }

    /// `"{txid}-{outputIndex}"`.
    pub fn event_id(&self) -> String {
        self.key.event_id()
    }

    pub fn end_time(&self) -> UnixSeconds {
        self.start_time.saturating_add(self.duration)
    }

    /// Whether the event's report log already holds an entry from `ven_id`.
    pub fn reported_by(&self, ven_id: &str) -> bool {
        self.payload.reports().iter().any(|r| r.ven_id == ven_id)
    }
}

/// Report a VEN sends in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub report_type: &'static str,
    pub report_value: String,
}

/// Chooses the report for `event`, or `None` for event types this VEN does
/// not act on.
pub fn respond(event: &Event) -> Option<Response> {
    match &event.payload {
        EventPayload::Simple(p) => {
            let level = p.level_text();
            tracing::info!(event_id = %event.event_id(), %level, "received SIMPLE event");
            Some(Response {
                report_type: "SIMPLE_LEVEL",
                report_value: level,
            })
        }
        EventPayload::Price(p) => {
            tracing::info!(event_id = %event.event_id(), price = %p.price, "received PRICE event");
            Some(Response {
                report_type: "PRICE",
                report_value: p.price.to_string(),
            })
        }
        EventPayload::Unknown { raw } => {
            tracing::info!(
                event_id = %event.event_id(),
                event_type = %event.event_type,
                payload_len = raw.len(),
                "unhandled event type"
            );
            None
        }
    }
}

//! Typed event payloads and the embedded report log.
//!
//! Payload bytes are application-defined. By convention they hold a JSON
//! object with a severity `level` (SIMPLE events) or a `price` (PRICE events)
//! and an append-only `reports` array. [`EventPayload::parse`] turns the
//! bytes into a tagged value once, at the codec boundary; anything that does
//! not fit the expected shape is kept as [`EventPayload::Unknown`] with its
//! raw bytes so it can still be indexed and forwarded untouched.

use openadr_types::{EventType, ReportEntry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PayloadError;

/// Payload of a SIMPLE event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePayload {
    /// Severity level of the signal. Publishers use integers, decimals and
    /// strings alike.
    pub level: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<ReportEntry>,
    /// Fields this node does not interpret, kept for re-encoding.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SimplePayload {
    /// The level as report text: strings unquoted, anything else as JSON.
    pub fn level_text(&self) -> String {
        match &self.level {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Payload of a PRICE event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePayload {
    /// Price as published; kept as a JSON number to avoid float rounding.
    pub price: serde_json::Number,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<ReportEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed view of an event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Simple(SimplePayload),
    Price(PricePayload),
    /// Unrecognised event type, or a payload that does not match its type.
    Unknown { raw: Vec<u8> },
}

impl EventPayload {
    /// Interprets `raw` according to `event_type`. Never fails.
    pub fn parse(event_type: &EventType, raw: &[u8]) -> Self {
        let parsed = match event_type {
            EventType::Simple => serde_json::from_slice(raw).map(Self::Simple),
            EventType::Price => serde_json::from_slice(raw).map(Self::Price),
            EventType::Other(_) => return Self::Unknown { raw: raw.to_vec() },
        };
        parsed.unwrap_or_else(|e| {
            tracing::debug!(event_type = %event_type, error = %e, "payload does not match event type");
            Self::Unknown { raw: raw.to_vec() }
        })
    }

    /// Report log entries, if the payload is typed.
    pub fn reports(&self) -> &[ReportEntry] {
        match self {
            Self::Simple(p) => &p.reports,
            Self::Price(p) => &p.reports,
            Self::Unknown { .. } => &[],
        }
    }
}

/// Result of [`append_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was added; carries the new payload bytes.
    Appended(Vec<u8>),
    /// An entry describing the same report is already present.
    Duplicate,
}

/// Appends `entry` to the `reports` array of a JSON-object payload.
///
/// All other payload fields are preserved. If an existing entry describes the
/// same report (see [`ReportEntry::is_same_report`]) nothing is appended.
///
/// # Errors
///
/// Returns `PayloadError` if the payload is not a JSON object or its
/// `reports` field is not an array.
pub fn append_report(
    raw: &[u8],
    entry: &ReportEntry,
    bucket_secs: u64,
) -> Result<AppendOutcome, PayloadError> {
    let mut doc: Value = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(raw)?
    };
    let obj = doc.as_object_mut().ok_or(PayloadError::NotAnObject)?;
    let reports = obj
        .entry("reports")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or(PayloadError::ReportsNotArray)?;

    let duplicate = reports
        .iter()
        .filter_map(|v| serde_json::from_value::<ReportEntry>(v.clone()).ok())
        .any(|existing| existing.is_same_report(entry, bucket_secs));
    if duplicate {
        return Ok(AppendOutcome::Duplicate);
    }

    reports.push(serde_json::to_value(entry)?);
    Ok(AppendOutcome::Appended(serde_json::to_vec(&doc)?))
}

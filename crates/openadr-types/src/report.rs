//! Report log entries embedded in event payloads.

use serde::{Deserialize, Serialize};

use crate::UnixSeconds;

/// One entry of an event's append-only report log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    /// Report tag, e.g. `LOAD_REDUCTION`.
    pub report_type: String,
    /// String-encoded report value.
    pub report_value: String,
    /// Identity of the reporting VEN.
    #[serde(rename = "venID")]
    pub ven_id: String,
    /// When the report was produced.
    pub timestamp: UnixSeconds,
    /// Idempotency token. Entries written by older producers may lack one.
    #[serde(rename = "reportID", default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

impl ReportEntry {
    /// Whether `other` describes the same logical report.
    ///
    /// Equal idempotency tokens always match. Otherwise the entries match
    /// when type, value and reporter agree and their timestamps fall in the
    /// same `bucket_secs` window (a zero bucket is treated as one second),
    /// so a report resent under a fresh token is still recognised.
    pub fn is_same_report(&self, other: &ReportEntry, bucket_secs: u64) -> bool {
        if self.report_id.is_some() && self.report_id == other.report_id {
            return true;
        }
        let bucket = bucket_secs.max(1) as i64;
        self.report_type == other.report_type
            && self.report_value == other.report_value
            && self.ven_id == other.ven_id
            && self.timestamp.div_euclid(bucket) == other.timestamp.div_euclid(bucket)
    }
}

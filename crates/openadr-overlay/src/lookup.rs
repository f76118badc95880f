//! Lookup service for `ls_openADR`.
//!
//! Ledger callbacks keep the event index in step with output admission,
//! spending and deletion. Queries return outpoint keys only; callers resolve
//! current state from the ledger themselves.

use openadr_contract::ContractCodec;
use openadr_store::{EventFilter, NewEvent};
use openadr_types::{
    EventStatus, EventType, OutpointKey, Txid, UnixSeconds, LOOKUP_SERVICE_NAME,
    TOPIC_MANAGER_NAME,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LookupError;
use crate::ServiceMetadata;

/// A lookup request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupQuestion {
    pub service: String,
    #[serde(default)]
    pub query: Value,
}

impl LookupQuestion {
    /// Question addressed to this service.
    pub fn new(query: Value) -> Self {
        Self {
            service: LOOKUP_SERVICE_NAME.to_string(),
            query,
        }
    }
}

/// The recognised query fields. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupQuery {
    #[serde(rename = "findAll", default, skip_serializing_if = "Option::is_none")]
    pub find_all: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(rename = "programID", default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(rename = "eventType", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
}

/// Lookup service backed by the SQLite event index.
#[derive(Debug, Clone, Default)]
pub struct LookupService {
    codec: ContractCodec,
}

impl LookupService {
    pub fn new(codec: ContractCodec) -> Self {
        Self { codec }
    }

    /// Indexes a newly admitted output.
    ///
    /// Outputs on other topics are ignored. A script that does not decode,
    /// or that admission would have refused, is logged and dropped. Returns
    /// whether a new record was written.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Store` if the index write fails.
    pub fn output_added(
        &self,
        conn: &Connection,
        txid: Txid,
        output_index: u32,
        locking_script: &[u8],
        topic: &str,
    ) -> Result<bool, LookupError> {
        if topic != TOPIC_MANAGER_NAME {
            return Ok(false);
        }
        let key = OutpointKey::new(txid, output_index);

        let state = match self.codec.decode(locking_script) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(%key, error = %e, "admitted output does not decode, not indexing");
                return Ok(false);
            }
        };
        if !state.is_admissible() {
            tracing::warn!(%key, "admitted output lacks an event type or program, not indexing");
            return Ok(false);
        }

        let inserted = openadr_store::insert_event(
            conn,
            &NewEvent {
                key,
                event_type: state.event_type.clone(),
                program_id: state.program_id.clone(),
                start_time: state.start_time,
                duration: state.duration,
                payload: state.payload,
            },
        )?;

        if inserted {
            tracing::info!(
                %key,
                event_type = %state.event_type,
                program_id = %state.program_id,
                start_time = state.start_time,
                duration = state.duration,
                "indexed OpenADR event"
            );
        }
        Ok(inserted)
    }

    /// Marks an indexed output as spent.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Store` if the index update fails.
    pub fn output_spent(
        &self,
        conn: &Connection,
        txid: Txid,
        output_index: u32,
        topic: &str,
    ) -> Result<bool, LookupError> {
        self.retire(conn, txid, output_index, topic, EventStatus::Spent)
    }

    /// Marks an indexed output as deleted.
    ///
    /// # Errors
    ///
    /// Returns `LookupError::Store` if the index update fails.
    pub fn output_deleted(
        &self,
        conn: &Connection,
        txid: Txid,
        output_index: u32,
        topic: &str,
    ) -> Result<bool, LookupError> {
        self.retire(conn, txid, output_index, topic, EventStatus::Deleted)
    }

    fn retire(
        &self,
        conn: &Connection,
        txid: Txid,
        output_index: u32,
        topic: &str,
        status: EventStatus,
    ) -> Result<bool, LookupError> {
        if topic != TOPIC_MANAGER_NAME {
            return Ok(false);
        }
        let key = OutpointKey::new(txid, output_index);
        let updated = openadr_store::set_status(conn, &key, status)?;
        if updated {
            tracing::info!(%key, %status, "OpenADR event retired");
        }
        Ok(updated)
    }

    /// Answers a lookup question with matching outpoint keys.
    ///
    /// - `{findAll: true}` returns every indexed key.
    /// - `{active: ..}` returns keys active at `now`, narrowed by
    ///   `programID` and `eventType` when present.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedService` for another service name,
    /// `UnsupportedQuery` for any other query shape, and `Store` if the
    /// index read fails.
    pub fn answer(
        &self,
        conn: &Connection,
        question: &LookupQuestion,
        now: UnixSeconds,
    ) -> Result<Vec<OutpointKey>, LookupError> {
        if question.service != LOOKUP_SERVICE_NAME {
            return Err(LookupError::UnsupportedService(question.service.clone()));
        }
        if !question.query.is_object() {
            return Err(LookupError::UnsupportedQuery(
                "query must be a JSON object".to_string(),
            ));
        }
        let query: LookupQuery = serde_json::from_value(question.query.clone())
            .map_err(|e| LookupError::UnsupportedQuery(e.to_string()))?;

        if query.find_all == Some(true) {
            return Ok(openadr_store::list_all(conn)?);
        }

        if query.active.is_some() {
            let filter = EventFilter {
                program_id: query.program_id,
                event_type: query.event_type,
            };
            return Ok(openadr_store::list_active(conn, now, &filter)?);
        }

        Err(LookupError::UnsupportedQuery(question.query.to_string()))
    }

    pub fn documentation(&self) -> String {
        format!(
            "# OpenADR Lookup Service\n\n\
             Service: `{LOOKUP_SERVICE_NAME}`\n\n\
             Send a question `{{\"service\": \"{LOOKUP_SERVICE_NAME}\", \"query\": ...}}` \
             with one of the following queries:\n\n\
             - `{{\"findAll\": true}}`: every indexed OpenADR event, in indexing order.\n\
             - `{{\"active\": true}}`: events whose window contains the current time \
             and whose output is unspent. Add `programID` and/or `eventType` to narrow \
             the result.\n\n\
             Answers are arrays of `{{\"txid\", \"outputIndex\"}}`. Resolve the \
             output from the ledger to read the event state.\n"
        )
    }

    pub fn metadata(&self) -> ServiceMetadata {
        ServiceMetadata::new(
            "OpenADR Lookup Service",
            "Query demand response events published on the ledger",
        )
    }
}

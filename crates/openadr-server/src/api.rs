//! HTTP handlers for admission, ledger callbacks and lookup.

use std::sync::Arc;

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use openadr_overlay::{AdmittanceInstructions, LookupError, LookupQuestion, ServiceMetadata};
use openadr_store::EventRecord;
use openadr_types::{OutpointKey, Txid};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::UnsupportedService(_) | LookupError::UnsupportedQuery(_) => {
                ApiError::BadRequest(e.to_string())
            }
            LookupError::Store(_) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

/// Runs `f` on the blocking pool with a pooled connection.
async fn with_conn<T, F>(state: Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState, &rusqlite::Connection) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        f(&state, &conn)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    hex::decode(value.trim()).map_err(|e| ApiError::BadRequest(format!("{field} is not valid hex: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmitRequest {
    /// Hex-encoded raw transaction.
    pub raw_tx: String,
    #[serde(default)]
    pub previous_coins: Vec<u32>,
}

/// Handler for `POST /admit`. Never fails: undecodable input admits
/// nothing.
pub async fn admit_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AdmitRequest>,
) -> Json<AdmittanceInstructions> {
    let raw_tx = match hex::decode(payload.raw_tx.trim()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "submitted transaction is not valid hex, admitting nothing");
            return Json(AdmittanceInstructions {
                outputs_to_admit: Vec::new(),
                coins_to_retain: payload.previous_coins,
            });
        }
    };
    Json(
        state
            .topic_manager
            .identify_admissible_outputs(&raw_tx, payload.previous_coins),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputAddedRequest {
    pub txid: Txid,
    pub output_index: u32,
    /// Hex-encoded locking script.
    pub locking_script: String,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRetiredRequest {
    pub txid: Txid,
    pub output_index: u32,
    pub topic: String,
}

/// Handler for `POST /outputs/added`.
pub async fn output_added_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<OutputAddedRequest>,
) -> Result<Json<Value>, ApiError> {
    let script = decode_hex("lockingScript", &payload.locking_script)?;
    let indexed = with_conn(state, move |state, conn| {
        Ok(state.lookup.output_added(
            conn,
            payload.txid,
            payload.output_index,
            &script,
            &payload.topic,
        )?)
    })
    .await?;
    Ok(Json(json!({ "indexed": indexed })))
}

/// Handler for `POST /outputs/spent`.
pub async fn output_spent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<OutputRetiredRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = with_conn(state, move |state, conn| {
        Ok(state
            .lookup
            .output_spent(conn, payload.txid, payload.output_index, &payload.topic)?)
    })
    .await?;
    Ok(Json(json!({ "updated": updated })))
}

/// Handler for `POST /outputs/deleted`.
pub async fn output_deleted_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<OutputRetiredRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = with_conn(state, move |state, conn| {
        Ok(state
            .lookup
            .output_deleted(conn, payload.txid, payload.output_index, &payload.topic)?)
    })
    .await?;
    Ok(Json(json!({ "updated": updated })))
}

/// Handler for `POST /lookup`.
pub async fn lookup_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(question): Json<LookupQuestion>,
) -> Result<Json<Vec<OutpointKey>>, ApiError> {
    let keys = with_conn(state, move |state, conn| {
        let now = (state.clock)();
        Ok(state.lookup.answer(conn, &question, now)?)
    })
    .await?;
    Ok(Json(keys))
}

/// An indexed event together with its payload.
#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub record: EventRecord,
    /// The payload as JSON when it parses, otherwise as a hex string.
    pub payload: Value,
}

impl From<EventRecord> for EventDetail {
    fn from(record: EventRecord) -> Self {
        let payload = serde_json::from_slice(&record.payload)
            .unwrap_or_else(|_| Value::String(hex::encode(&record.payload)));
        Self { record, payload }
    }
}

/// Handler for `GET /events/{txid}/{outputIndex}`.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((txid, output_index)): Path<(String, u32)>,
) -> Result<Json<EventDetail>, ApiError> {
    let txid: Txid = txid
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid txid: {e}")))?;
    let key = OutpointKey::new(txid, output_index);

    let record = with_conn(state, move |_, conn| {
        openadr_store::get_event(conn, &key)
            .map_err(|e| ApiError::InternalServerError(e.to_string()))
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("no event indexed at {key}")))?;

    Ok(Json(EventDetail::from(record)))
}

fn markdown(doc: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], doc)
}

/// Handler for `GET /docs/topic-manager`.
pub async fn topic_manager_docs_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    markdown(state.topic_manager.documentation())
}

/// Handler for `GET /docs/lookup-service`.
pub async fn lookup_service_docs_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    markdown(state.lookup.documentation())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub topic_manager: ServiceMetadata,
    pub lookup_service: ServiceMetadata,
}

/// Handler for `GET /metadata`.
pub async fn metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<MetadataResponse> {
    Json(MetadataResponse {
        topic_manager: state.topic_manager.metadata(),
        lookup_service: state.lookup.metadata(),
    })
}

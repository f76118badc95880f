//! OpenADR overlay host.
//!
//! Serves the topic manager and lookup service over HTTP. The ledger host
//! calls `/admit` to learn which outputs of a transaction belong to the
//! topic, then reports admitted, spent and deleted outputs to the
//! `/outputs/*` callbacks; VENs query `/lookup` for active events.

pub mod api;
pub mod config;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use openadr_db::DbPool;
use openadr_overlay::{LookupService, TopicManager};
use openadr_types::UnixSeconds;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    pub topic_manager: TopicManager,
    pub lookup: LookupService,
    /// Source of "now" for active-window queries.
    pub clock: fn() -> UnixSeconds,
}

impl AppState {
    /// State with the wall clock.
    pub fn new(pool: DbPool, topic_manager: TopicManager, lookup: LookupService) -> Self {
        Self {
            pool,
            topic_manager,
            lookup,
            clock: system_now,
        }
    }
}

/// Current UTC time in whole seconds.
pub fn system_now() -> UnixSeconds {
    chrono::Utc::now().timestamp()
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metadata", get(api::metadata_handler))
        .route("/admit", post(api::admit_handler))
        .route("/outputs/added", post(api::output_added_handler))
        .route("/outputs/spent", post(api::output_spent_handler))
        .route("/outputs/deleted", post(api::output_deleted_handler))
        .route("/lookup", post(api::lookup_handler))
        .route("/events/{txid}/{output_index}", get(api::get_event_handler))
        .route("/docs/topic-manager", get(api::topic_manager_docs_handler))
        .route("/docs/lookup-service", get(api::lookup_service_docs_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

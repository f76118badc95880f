//! Overlay-side services for OpenADR events.
//!
//! Two services sit between the ledger host and the event index:
//!
//! - [`TopicManager`] decides which outputs of a submitted transaction are
//!   OpenADR events (topic `tm_openADR`).
//! - [`LookupService`] keeps the index in step with ledger callbacks and
//!   answers queries (service `ls_openADR`) with outpoint keys.
//!
//! Both are stateless apart from the contract codec they hold, so a host can
//! share one instance across worker threads.

pub mod error;
pub mod lookup;
pub mod topic_manager;

pub use error::LookupError;
pub use lookup::{LookupQuery, LookupQuestion, LookupService};
pub use topic_manager::{AdmittanceInstructions, TopicManager};

use serde::Serialize;

/// Descriptive metadata a host publishes for each service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub name: String,
    pub short_description: String,
    pub version: String,
}

impl ServiceMetadata {
    fn new(name: &str, short_description: &str) -> Self {
        Self {
            name: name.to_string(),
            short_description: short_description.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

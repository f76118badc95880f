//! OpenADR VEN (Virtual End Node) client.
//!
//! A [`VenClient`] registers with a VTN for one program, then polls the
//! overlay lookup service for active events. Each new event is resolved from
//! the ledger, dispatched by event type, and answered with a report that is
//! sent to the VTN and then recorded on the event's ledger output.
//!
//! # Delivery
//!
//! Events are dispatched at least once per client. A [`RecencyCache`] keeps
//! dispatched keys until their event window closes, so an event is not
//! dispatched twice while it is active. Distinct VENs do not coordinate.
//!
//! # Collaborators
//!
//! All I/O goes through the [`Vtn`], [`LookupResolver`] and [`Ledger`]
//! traits. [`HttpVtn`], [`HttpLookupResolver`] and [`HttpLedger`] implement
//! them over HTTP with a shared [`RetryPolicy`].

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
mod history;
pub mod http;
pub mod ports;
pub mod recency;
pub mod wire;

pub use client::{
    ClientState, OnChainOutcome, PollOutcome, PollSummary, Ports, ReportReceipt, VenClient,
    VenSettings, LOAD_REDUCTION,
};
pub use config::{load_config, ConfigError, VenConfig};
pub use dispatch::{respond, Event, Response};
pub use error::{ReportError, TransportError, VenError};
pub use http::{build_client, HttpLedger, HttpLookupResolver, HttpVtn, RetryPolicy};
pub use ports::{Clock, Ledger, LookupResolver, SuccessorSpend, SystemClock, Vtn};
pub use recency::RecencyCache;

//! Event index for the OpenADR overlay.
//!
//! Tracks one [`EventRecord`] per admitted ledger output, keyed by
//! `(txid, output_index)`, together with its lifecycle status. The index is
//! deliberately minimal: queries return only outpoint keys, and consumers
//! resolve full state from the ledger so the index never serves a stale
//! payload.
//!
//! # Guarantees
//!
//! - Inserting an existing key is a no-op ([`insert_event`] returns `false`).
//! - Status moves only from `active` to `spent` or `deleted`
//!   ([`set_status`] ignores unknown keys and terminal records).
//! - [`list_active`] returns records that are status-active *and* inside
//!   their `[start_time, start_time + duration)` window at `now`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use openadr_store::{insert_event, list_active, set_status, EventFilter, NewEvent};
//!
//! insert_event(&conn, &new_event)?;
//! let keys = list_active(&conn, now, &EventFilter::for_program("residential-demand-response"))?;
//! set_status(&conn, &keys[0], EventStatus::Spent)?;
//! ```

mod error;
mod record;
mod store;

pub use error::StoreError;
pub use record::{EventFilter, EventRecord, NewEvent};
pub use store::{get_event, insert_event, list_active, list_all, set_status};

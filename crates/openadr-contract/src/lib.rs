//! OpenADR contract state on the ledger.
//!
//! An OpenADR event lives in a single ledger output whose locking script
//! carries five state fields: event type, program ID, start time, duration,
//! and an opaque payload. This crate owns everything needed to move between
//! those bytes and typed values:
//!
//! - [`ContractCodec`]: encodes/decodes the five-field state to/from a
//!   locking script, bound to a [`ContractSchema`] constructed at startup.
//! - [`EventPayload`]: the typed view of a payload, decoded once so that
//!   downstream dispatch is an exhaustive match.
//! - [`append_report`]: idempotent append to a payload's report log.
//! - [`Transaction`]: a parser for raw ledger transactions, used to
//!   enumerate outputs during admission and to resolve outputs on the VEN.
//!
//! # Script layout
//!
//! ```text
//! <schema code> OP_RETURN
//!   PUSH(eventType) PUSH(programID) PUSH(startTime) PUSH(duration) PUSH(payload)
//!   <u32 LE state length> <version 0x00>
//! ```
//!
//! Decoding is strict: every encoding has exactly one accepted byte form, so
//! `encode(decode(x)) == x` for every script that decodes.

mod codec;
mod error;
mod payload;
mod schema;
mod script;
mod transaction;

pub use codec::{ContractCodec, ContractState};
pub use error::{CodecError, PayloadError, SchemaError, TransactionError};
pub use payload::{append_report, AppendOutcome, EventPayload, PricePayload, SimplePayload};
pub use schema::ContractSchema;
pub use transaction::{txid_of, Transaction, TxInput, TxOutput};

//! Outbound ports of the VEN client.
//!
//! The client only talks to the outside world through these traits. The
//! reqwest implementations live in [`crate::http`]; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use openadr_contract::Transaction;
use openadr_types::{OutpointKey, Txid, UnixSeconds};

use crate::error::TransportError;
use crate::wire::{LookupRequest, VenRegistration, VtnReport};

/// The VTN the VEN registers with and reports to.
#[async_trait]
pub trait Vtn: Send + Sync {
    /// Registers the VEN for its program.
    async fn register(&self, registration: &VenRegistration) -> Result<(), TransportError>;

    /// Submits one report.
    async fn submit_report(&self, report: &VtnReport) -> Result<(), TransportError>;
}

/// The overlay lookup endpoint.
#[async_trait]
pub trait LookupResolver: Send + Sync {
    /// Runs a lookup query and returns the matching outpoints.
    async fn query(&self, request: &LookupRequest) -> Result<Vec<OutpointKey>, TransportError>;
}

/// A successor output to publish in place of a spent event output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessorSpend {
    pub description: String,
    /// The event output being spent.
    pub spends: OutpointKey,
    pub locking_script: Vec<u8>,
    pub satoshis: u64,
}

/// Ledger access: reading transactions and publishing successors.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetches and parses a transaction by id.
    async fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction, TransportError>;

    /// Publishes a transaction spending `spend.spends` with the successor
    /// as output 0, returning the new transaction id.
    async fn publish_successor(&self, spend: &SuccessorSpend) -> Result<Txid, TransportError>;
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixSeconds;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixSeconds {
        chrono::Utc::now().timestamp()
    }
}

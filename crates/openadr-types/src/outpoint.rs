//! Ledger output identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A 32-byte ledger transaction identifier.
///
/// Rendered as 64 lowercase hex characters in display order (the byte order
/// block explorers and wallets use).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Txid(pub [u8; 32]);

/// Error returned when a string is not a 64-char hex transaction id.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseTxidError {
    #[error("txid must be 64 hex characters, got {0}")]
    Length(usize),
    #[error("txid is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl Txid {
    /// Returns the raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the hex rendering of this id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::str::FromStr for Txid {
    type Err = ParseTxidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseTxidError::Length(s.len()));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl std::fmt::Display for Txid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Txid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Txid({})", self.to_hex())
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Composite key of an indexed event: the output it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutpointKey {
    /// Transaction that created the output.
    pub txid: Txid,
    /// Position of the output within that transaction.
    #[serde(rename = "outputIndex")]
    pub output_index: u32,
}

impl OutpointKey {
    pub fn new(txid: Txid, output_index: u32) -> Self {
        Self { txid, output_index }
    }

    /// Event identifier used when reporting to a VTN: `"{txid}-{index}"`.
    pub fn event_id(&self) -> String {
        format!("{}-{}", self.txid, self.output_index)
    }
}

/// Renders as `"{txid}.{index}"`, the wallet outpoint notation.
impl std::fmt::Display for OutpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.txid, self.output_index)
    }
}

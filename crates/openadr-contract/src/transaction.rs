//! Raw ledger transaction parsing.
//!
//! Layout: `version:u32le | varint n_in | inputs | varint n_out | outputs |
//! lock_time:u32le`, where an input is `prev_txid[32] | prev_index:u32le |
//! varint script_len | script | sequence:u32le` and an output is
//! `satoshis:u64le | varint script_len | script`. Transaction ids are the
//! double SHA-256 of the raw bytes, byte-reversed for display.

use openadr_types::{OutpointKey, Txid};
use sha2::{Digest, Sha256};

use crate::error::TransactionError;

/// A transaction input: the outpoint it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutpointKey,
    pub unlocking_script: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
}

/// A parsed ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Parses raw transaction bytes.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::Truncated` if the bytes end early,
    /// `TransactionError::TrailingData` if bytes remain after the lock time
    /// and `TransactionError::NonCanonicalVarint` for a length prefix that
    /// is longer than necessary. Only canonical bytes parse, so
    /// [`Transaction::txid`] always matches the id of the parsed bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, TransactionError> {
        let mut r = ByteReader { bytes: raw, pos: 0 };

        let version = r.u32()?;
        let n_in = r.varint()?;
        let mut inputs = Vec::with_capacity(r.bounded_capacity(n_in));
        for _ in 0..n_in {
            let mut txid = [0u8; 32];
            txid.copy_from_slice(r.take(32)?);
            txid.reverse();
            let index = r.u32()?;
            let script_len = r.varint()?;
            let unlocking_script = r.take_len(script_len)?.to_vec();
            let sequence = r.u32()?;
            inputs.push(TxInput {
                previous_output: OutpointKey::new(Txid(txid), index),
                unlocking_script,
                sequence,
            });
        }

        let n_out = r.varint()?;
        let mut outputs = Vec::with_capacity(r.bounded_capacity(n_out));
        for _ in 0..n_out {
            let satoshis = r.u64()?;
            let script_len = r.varint()?;
            let locking_script = r.take_len(script_len)?.to_vec();
            outputs.push(TxOutput {
                satoshis,
                locking_script,
            });
        }

        let lock_time = r.u32()?;
        let remaining = raw.len() - r.pos;
        if remaining > 0 {
            return Err(TransactionError::TrailingData(remaining));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Parses a hex-encoded raw transaction.
    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        Self::from_bytes(&hex::decode(hex_str.trim())?)
    }

    /// Serialises back to raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            let mut txid = *input.previous_output.txid.as_bytes();
            txid.reverse();
            out.extend_from_slice(&txid);
            out.extend_from_slice(&input.previous_output.output_index.to_le_bytes());
            write_varint(&mut out, input.unlocking_script.len() as u64);
            out.extend_from_slice(&input.unlocking_script);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.satoshis.to_le_bytes());
            write_varint(&mut out, output.locking_script.len() as u64);
            out.extend_from_slice(&output.locking_script);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Transaction id of these bytes.
    pub fn txid(&self) -> Txid {
        txid_of(&self.to_bytes())
    }

    /// Key of the output at `index` in this transaction.
    pub fn outpoint(&self, index: u32) -> OutpointKey {
        OutpointKey::new(self.txid(), index)
    }
}

/// Computes the transaction id of raw transaction bytes.
pub fn txid_of(raw: &[u8]) -> Txid {
    let first = Sha256::digest(raw);
    let second = Sha256::digest(first);
    let mut id = [0u8; 32];
    id.copy_from_slice(&second);
    id.reverse();
    Txid(id)
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], TransactionError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(TransactionError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_len(&mut self, n: u64) -> Result<&'a [u8], TransactionError> {
        let n = usize::try_from(n).map_err(|_| TransactionError::Truncated(self.pos))?;
        self.take(n)
    }

    fn u32(&mut self) -> Result<u32, TransactionError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, TransactionError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn varint(&mut self) -> Result<u64, TransactionError> {
        let start = self.pos;
        let (value, min) = match self.take(1)?[0] {
            0xfd => {
                let b = self.take(2)?;
                (u16::from_le_bytes([b[0], b[1]]) as u64, 0xfd)
            }
            0xfe => (self.u32()? as u64, 0x1_0000),
            0xff => (self.u64()?, 0x1_0000_0000),
            n => return Ok(n as u64),
        };
        if value < min {
            return Err(TransactionError::NonCanonicalVarint(start));
        }
        Ok(value)
    }

    /// Caps a declared element count by what the remaining bytes could hold,
    /// so a hostile count cannot force a huge allocation.
    fn bounded_capacity(&self, declared: u64) -> usize {
        let remaining = self.bytes.len().saturating_sub(self.pos);
        usize::try_from(declared).unwrap_or(usize::MAX).min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutpointKey::new(Txid([0x11; 32]), 2),
                unlocking_script: vec![0x51],
                sequence: 0xffff_ffff,
            }],
            outputs: vec![
                TxOutput {
                    satoshis: 1,
                    locking_script: vec![0x6a, 0x01, 0x02],
                },
                TxOutput {
                    satoshis: 5000,
                    locking_script: vec![0xac; 300],
                },
            ],
            lock_time: 0,
        }
    }

    #[test]
    fn parse_inverts_serialise() {
        let tx = sample_tx();
        let raw = tx.to_bytes();
        assert_eq!(Transaction::from_bytes(&raw).unwrap(), tx);
        assert_eq!(Transaction::from_hex(&hex::encode(&raw)).unwrap(), tx);
    }

    #[test]
    fn txid_is_reversed_double_sha256() {
        let raw = sample_tx().to_bytes();
        let digest = Sha256::digest(Sha256::digest(&raw));
        let mut expected = [0u8; 32];
        expected.copy_from_slice(&digest);
        expected.reverse();
        assert_eq!(sample_tx().txid(), Txid(expected));
        assert_eq!(txid_of(&raw), Txid(expected));
    }

    #[test]
    fn input_outpoint_uses_display_order() {
        let mut tx = sample_tx();
        let mut id = [0u8; 32];
        id[0] = 0xaa;
        tx.inputs[0].previous_output.txid = Txid(id);
        let raw = tx.to_bytes();
        // Internal byte order puts the display-first byte last.
        assert_eq!(raw[4 + 1 + 31], 0xaa);
        assert_eq!(Transaction::from_bytes(&raw).unwrap().inputs[0].previous_output.txid, Txid(id));
    }

    #[test]
    fn truncated_bytes_fail() {
        let raw = sample_tx().to_bytes();
        for cut in [1, 10, raw.len() - 1] {
            assert!(matches!(
                Transaction::from_bytes(&raw[..raw.len() - cut]),
                Err(TransactionError::Truncated(_))
            ));
        }
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut raw = sample_tx().to_bytes();
        raw.push(0);
        assert_eq!(Transaction::from_bytes(&raw), Err(TransactionError::TrailingData(1)));
    }

    #[test]
    fn hostile_counts_do_not_allocate() {
        // version, then an input count of u64::MAX with nothing behind it.
        let mut raw = vec![1, 0, 0, 0, 0xff];
        raw.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            Transaction::from_bytes(&raw),
            Err(TransactionError::Truncated(_))
        ));
    }

    #[test]
    fn padded_length_prefix_fails() {
        let tx = sample_tx();
        let canonical = tx.to_bytes();
        // Re-encode the input count (1) as 0xfd 0x01 0x00.
        let mut padded = canonical[..4].to_vec();
        padded.extend_from_slice(&[0xfd, 0x01, 0x00]);
        padded.extend_from_slice(&canonical[5..]);

        assert_eq!(
            Transaction::from_bytes(&padded),
            Err(TransactionError::NonCanonicalVarint(4))
        );
    }

    #[test]
    fn varint_boundaries_round_trip() {
        for len in [0xfc, 0xfd, 0xffff, 0x1_0000] {
            let mut tx = sample_tx();
            tx.outputs[1].locking_script = vec![0x51; len];
            let raw = tx.to_bytes();
            let parsed = Transaction::from_bytes(&raw).unwrap();
            assert_eq!(parsed.outputs[1].locking_script.len(), len);
            assert_eq!(parsed.txid(), txid_of(&raw));
        }
    }

    #[test]
    fn bad_hex_fails() {
        assert!(matches!(Transaction::from_hex("zz"), Err(TransactionError::Hex(_))));
    }
}

//! Script push and number primitives.

use crate::error::CodecError;

pub(crate) const OP_0: u8 = 0x00;
pub(crate) const OP_PUSHDATA1: u8 = 0x4c;
pub(crate) const OP_PUSHDATA2: u8 = 0x4d;
pub(crate) const OP_PUSHDATA4: u8 = 0x4e;
pub(crate) const OP_RETURN: u8 = 0x6a;

/// Largest payload a direct push opcode can carry.
const MAX_DIRECT_PUSH: usize = 75;

/// Appends `data` as a single push using the shortest form for its length.
pub(crate) fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len == 0 {
        out.push(OP_0);
        return;
    }
    if len <= MAX_DIRECT_PUSH {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Sequential reader over script bytes.
pub(crate) struct ScriptReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ScriptReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Reads one data push, rejecting any form [`push_data`] would not emit.
    pub(crate) fn read_push(&mut self) -> Result<&'a [u8], CodecError> {
        let opcode = self.byte()?;
        let (len, min_len) = match opcode {
            OP_0 => return Ok(&[]),
            1..=0x4b => (opcode as usize, 1),
            OP_PUSHDATA1 => (self.byte()? as usize, MAX_DIRECT_PUSH + 1),
            OP_PUSHDATA2 => {
                let b = self.take(2)?;
                (u16::from_le_bytes([b[0], b[1]]) as usize, 0x100)
            }
            OP_PUSHDATA4 => {
                let b = self.take(4)?;
                (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize, 0x1_0000)
            }
            other => return Err(CodecError::UnexpectedOpcode(other)),
        };
        if len < min_len {
            return Err(CodecError::NonCanonicalPush(len));
        }
        self.take(len)
    }
}

/// Encodes an integer as a minimal little-endian sign-magnitude script number.
pub(crate) fn encode_script_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut magnitude = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Decodes a script number, rejecting non-minimal encodings.
pub(crate) fn decode_script_num(bytes: &[u8]) -> Result<i64, CodecError> {
    let Some((&last, rest)) = bytes.split_last() else {
        return Ok(0);
    };
    if bytes.len() > 9 {
        return Err(CodecError::NumberOverflow);
    }
    // A final byte holding only the sign bit is allowed only when the
    // preceding byte needs its high bit for magnitude.
    if last & 0x7f == 0 && rest.last().map_or(true, |b| b & 0x80 == 0) {
        return Err(CodecError::NonMinimalNumber);
    }

    let mut magnitude: u128 = 0;
    for (i, b) in bytes.iter().enumerate() {
        let b = if i == bytes.len() - 1 { b & 0x7f } else { *b };
        magnitude |= (b as u128) << (8 * i);
    }
    let value = if last & 0x80 != 0 {
        -(magnitude as i128)
    } else {
        magnitude as i128
    };
    i64::try_from(value).map_err(|_| CodecError::NumberOverflow)
}

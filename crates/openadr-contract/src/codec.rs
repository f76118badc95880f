//! Encoding and decoding of the five-field event state.

use openadr_types::{EventType, UnixSeconds};

use crate::error::CodecError;
use crate::payload::EventPayload;
use crate::schema::ContractSchema;
use crate::script::{decode_script_num, encode_script_num, push_data, ScriptReader, OP_RETURN};

/// State format version written after the length footer.
const STATE_VERSION: u8 = 0x00;

/// Footer: 4-byte state length plus the version byte.
const FOOTER_LEN: usize = 5;

/// The state held by one OpenADR output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    pub event_type: EventType,
    pub program_id: String,
    pub start_time: UnixSeconds,
    /// Window length in seconds; always positive.
    pub duration: i64,
    /// Application-defined payload bytes (a JSON object by convention).
    pub payload: Vec<u8>,
}

impl ContractState {
    /// First second after the event window.
    pub fn end_time(&self) -> UnixSeconds {
        self.start_time.saturating_add(self.duration)
    }

    /// Whether `now` falls inside `[start_time, start_time + duration)`.
    pub fn in_window(&self, now: UnixSeconds) -> bool {
        self.start_time <= now && now < self.end_time()
    }

    /// Whether the state names both an event type and a program; outputs
    /// without them are neither admitted nor indexed.
    pub fn is_admissible(&self) -> bool {
        !self.event_type.as_str().is_empty() && !self.program_id.is_empty()
    }

    /// Typed view of the payload.
    pub fn typed_payload(&self) -> EventPayload {
        EventPayload::parse(&self.event_type, &self.payload)
    }

    /// Same event with a replaced payload; the only mutation a successor
    /// output is allowed to carry.
    pub fn with_payload(&self, payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), CodecError> {
        if self.start_time < 0 {
            return Err(CodecError::InvalidField(format!(
                "startTime must not be negative, got {}",
                self.start_time
            )));
        }
        if self.duration <= 0 {
            return Err(CodecError::InvalidField(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}

/// Encodes and decodes OpenADR state for one contract schema.
#[derive(Debug, Clone, Default)]
pub struct ContractCodec {
    schema: ContractSchema,
}

impl ContractCodec {
    pub fn new(schema: ContractSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ContractSchema {
        &self.schema
    }

    /// Builds the locking script for `state`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::InvalidField` if the start time is negative or
    /// the duration is not positive.
    pub fn encode(&self, state: &ContractState) -> Result<Vec<u8>, CodecError> {
        state.validate()?;

        let mut section = Vec::with_capacity(
            state.event_type.as_str().len() + state.program_id.len() + state.payload.len() + 32,
        );
        push_data(&mut section, state.event_type.as_str().as_bytes());
        push_data(&mut section, state.program_id.as_bytes());
        push_data(&mut section, &encode_script_num(state.start_time));
        push_data(&mut section, &encode_script_num(state.duration));
        push_data(&mut section, &state.payload);

        let declared = u32::try_from(section.len())
            .map_err(|_| CodecError::InvalidField("state section exceeds 4 GiB".to_string()))?;

        let code = self.schema.code();
        let mut script = Vec::with_capacity(code.len() + 1 + section.len() + FOOTER_LEN);
        script.extend_from_slice(code);
        script.push(OP_RETURN);
        script.extend_from_slice(&section);
        script.extend_from_slice(&declared.to_le_bytes());
        script.push(STATE_VERSION);
        Ok(script)
    }

    /// Recovers the state from a locking script.
    ///
    /// # Errors
    ///
    /// Returns a `CodecError` describing the first mismatch. Outputs that are
    /// not OpenADR outputs typically fail with `PrefixMismatch`.
    pub fn decode(&self, script: &[u8]) -> Result<ContractState, CodecError> {
        let rest = script
            .strip_prefix(self.schema.code())
            .and_then(|rest| rest.strip_prefix(&[OP_RETURN]))
            .ok_or(CodecError::PrefixMismatch)?;

        if rest.len() < FOOTER_LEN {
            return Err(CodecError::Truncated);
        }
        let (section, footer) = rest.split_at(rest.len() - FOOTER_LEN);
        if footer[4] != STATE_VERSION {
            return Err(CodecError::UnsupportedVersion(footer[4]));
        }
        let declared = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]) as usize;
        if declared != section.len() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: section.len(),
            });
        }

        let mut reader = ScriptReader::new(section);
        let event_type = utf8(reader.read_push()?, "eventType")?;
        let program_id = utf8(reader.read_push()?, "programID")?;
        let start_time = decode_script_num(reader.read_push()?)?;
        let duration = decode_script_num(reader.read_push()?)?;
        let payload = reader.read_push()?.to_vec();
        if !reader.is_empty() {
            return Err(CodecError::TrailingData);
        }

        let state = ContractState {
            event_type: EventType::from(event_type),
            program_id,
            start_time,
            duration,
            payload,
        };
        state.validate()?;
        Ok(state)
    }
}

fn utf8(bytes: &[u8], field: &'static str) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8(field))
}

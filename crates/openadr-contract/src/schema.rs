//! Contract schema registry value.

use serde::Deserialize;

use crate::error::SchemaError;

/// Name of the OpenADR contract in compiled artifacts.
pub const CONTRACT_NAME: &str = "OpenADR";

/// Built-in contract code: pushes the contract tag and drops it. Deployments
/// that compile their own contract load the code from an artifact instead.
const DEFAULT_CODE: &[u8] = &[0x07, b'O', b'p', b'e', b'n', b'A', b'D', b'R', 0x75];

/// The compiled contract a codec recognises.
///
/// Built once at startup and handed to every [`ContractCodec`] that needs it;
/// two schemas with different code never recognise each other's outputs.
///
/// [`ContractCodec`]: crate::ContractCodec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSchema {
    name: String,
    version: u32,
    code: Vec<u8>,
}

/// On-disk artifact layout.
#[derive(Debug, Deserialize)]
struct Artifact {
    contract: String,
    #[serde(default = "default_artifact_version")]
    version: u32,
    hex: String,
}

fn default_artifact_version() -> u32 {
    1
}

impl Default for ContractSchema {
    fn default() -> Self {
        Self {
            name: CONTRACT_NAME.to_string(),
            version: 1,
            code: DEFAULT_CODE.to_vec(),
        }
    }
}

impl ContractSchema {
    /// Builds a schema from raw contract code.
    pub fn new(name: impl Into<String>, version: u32, code: Vec<u8>) -> Result<Self, SchemaError> {
        if code.is_empty() {
            return Err(SchemaError::EmptyCode);
        }
        Ok(Self {
            name: name.into(),
            version,
            code,
        })
    }

    /// Parses an artifact document: `{"contract", "version", "hex"}`.
    pub fn from_artifact_json(json: &str) -> Result<Self, SchemaError> {
        let artifact: Artifact = serde_json::from_str(json)?;
        let code = hex::decode(artifact.hex.trim())?;
        Self::new(artifact.contract, artifact.version, code)
    }

    /// Reads and parses an artifact file.
    pub fn from_artifact_file(path: impl AsRef<std::path::Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let schema = Self::from_artifact_json(&contents)?;
        tracing::info!(
            path = %path.display(),
            contract = %schema.name,
            version = schema.version,
            code_len = schema.code.len(),
            "loaded contract artifact"
        );
        Ok(schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Compiled contract code preceding the state section.
    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

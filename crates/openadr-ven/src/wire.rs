//! JSON bodies exchanged with the VTN, overlay and wallet.

use openadr_types::OutpointKey;
use serde::{Deserialize, Serialize};

/// `POST {vtn}/vens` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenRegistration {
    pub ven_name: String,
    pub targets: Vec<Target>,
}

impl VenRegistration {
    /// Registration subscribing `ven_name` to a single program.
    pub fn for_program(ven_name: &str, program_id: &str) -> Self {
        Self {
            ven_name: ven_name.to_string(),
            targets: vec![Target {
                kind: "PROGRAM_NAME".to_string(),
                values: vec![program_id.to_string()],
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: String,
    pub values: Vec<String>,
}

/// `POST {vtn}/reports` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VtnReport {
    pub report_name: String,
    #[serde(rename = "programID")]
    pub program_id: String,
    #[serde(rename = "eventID")]
    pub event_id: String,
    pub client_name: String,
    pub resources: Vec<ReportResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResource {
    pub resource_name: String,
    pub intervals: Vec<ReportInterval>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInterval {
    pub id: u32,
    pub payloads: Vec<ReportValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub values: Vec<String>,
}

impl VtnReport {
    /// A single-value report for one event, on the `VEN_RESOURCE` resource.
    pub fn single_value(
        report_type: &str,
        report_id: &str,
        program_id: &str,
        event: &OutpointKey,
        client_name: &str,
        value: &str,
    ) -> Self {
        Self {
            report_name: format!("{report_type}_{report_id}"),
            program_id: program_id.to_string(),
            event_id: event.event_id(),
            client_name: client_name.to_string(),
            resources: vec![ReportResource {
                resource_name: "VEN_RESOURCE".to_string(),
                intervals: vec![ReportInterval {
                    id: 0,
                    payloads: vec![ReportValue {
                        kind: report_type.to_string(),
                        values: vec![value.to_string()],
                    }],
                }],
            }],
        }
    }
}

/// `POST {overlay}/lookup` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub service: String,
    pub query: serde_json::Value,
}

/// Lookup answers come back either as a bare array or wrapped in `result`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum LookupAnswer {
    Keys(Vec<OutpointKey>),
    Wrapped { result: Vec<OutpointKey> },
}

impl LookupAnswer {
    pub(crate) fn into_keys(self) -> Vec<OutpointKey> {
        match self {
            Self::Keys(keys) | Self::Wrapped { result: keys } => keys,
        }
    }
}

/// `POST {wallet}/createAction` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAction {
    pub description: String,
    pub inputs: Vec<ActionInput>,
    pub outputs: Vec<ActionOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionInput {
    /// `"{txid}.{index}"`.
    pub outpoint: String,
    pub input_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutput {
    /// Hex-encoded locking script.
    pub locking_script: String,
    pub satoshis: u64,
    pub output_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct CreateActionResult {
    pub txid: String,
}

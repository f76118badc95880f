//! Admission of OpenADR event outputs.
//!
//! A transaction is offered to the topic manager as raw bytes. Every output
//! whose locking script decodes under the contract schema, with a non-empty
//! event type and program id, is admitted. Anything else is simply not an
//! OpenADR output; the only failure mode is a transaction that cannot be
//! parsed at all, which admits nothing.

use openadr_contract::{ContractCodec, ContractState, Transaction};
use openadr_types::TOPIC_MANAGER_NAME;
use serde::{Deserialize, Serialize};

use crate::ServiceMetadata;

/// Which outputs to admit and which previously retained coins to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmittanceInstructions {
    /// Output indices, in transaction order.
    pub outputs_to_admit: Vec<u32>,
    /// Passed through unchanged from the caller.
    pub coins_to_retain: Vec<u32>,
}

/// Topic manager for `tm_openADR`.
#[derive(Debug, Clone, Default)]
pub struct TopicManager {
    codec: ContractCodec,
}

impl TopicManager {
    pub fn new(codec: ContractCodec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &ContractCodec {
        &self.codec
    }

    /// Decides which outputs of `raw_tx` carry OpenADR events.
    ///
    /// Never fails: a malformed transaction is logged and yields an empty
    /// admit list.
    pub fn identify_admissible_outputs(
        &self,
        raw_tx: &[u8],
        previous_coins: Vec<u32>,
    ) -> AdmittanceInstructions {
        let outputs_to_admit = match Transaction::from_bytes(raw_tx) {
            Ok(tx) => self.admissible_outputs(&tx),
            Err(e) => {
                tracing::warn!(error = %e, "could not parse submitted transaction");
                Vec::new()
            }
        };

        AdmittanceInstructions {
            outputs_to_admit,
            coins_to_retain: previous_coins,
        }
    }

    /// Indices of the admissible outputs of an already parsed transaction.
    pub fn admissible_outputs(&self, tx: &Transaction) -> Vec<u32> {
        let txid = tx.txid();
        let mut admitted = Vec::new();

        for (index, output) in (0u32..).zip(tx.outputs.iter()) {
            match self.admissible_state(&output.locking_script) {
                Some(state) => {
                    tracing::info!(
                        %txid,
                        output_index = index,
                        event_type = %state.event_type,
                        program_id = %state.program_id,
                        "admitting OpenADR event output"
                    );
                    admitted.push(index);
                }
                None => {
                    tracing::debug!(%txid, output_index = index, "output is not an OpenADR event");
                }
            }
        }
        admitted
    }

    /// Decodes `script` and returns its state if it qualifies for admission.
    pub fn admissible_state(&self, script: &[u8]) -> Option<ContractState> {
        let state = self.codec.decode(script).ok()?;
        state.is_admissible().then_some(state)
    }

    pub fn documentation(&self) -> String {
        format!(
            "# OpenADR Topic Manager\n\n\
             Topic: `{TOPIC_MANAGER_NAME}`\n\n\
             Admits transaction outputs whose locking script carries an OpenADR \
             event under the `{}` contract (version {}): an event type, a program \
             id, a start time, a duration in seconds, and an application payload.\n\n\
             Outputs that do not decode, or whose event type or program id is \
             empty, are ignored. Previously retained coins are kept unchanged.\n",
            self.codec.schema().name(),
            self.codec.schema().version(),
        )
    }

    pub fn metadata(&self) -> ServiceMetadata {
        ServiceMetadata::new(
            "OpenADR Topic Manager",
            "Admits demand response events published on the ledger",
        )
    }
}

//! Disclosure ("verification") session flavor: the client app proves
//! possession of attested attributes without signing a message.
//!
//! Structurally identical to the signature flavor; the result carries the
//! disclosed attribute map instead of a signature.

use std::collections::BTreeMap;

use attesta_core::{AttributeDisjunction, AttributeId, Context, Nonce, ProofStatus};
use serde::{Deserialize, Serialize};

use crate::flavor::{ClientRequest, Flavor, ProofRequest, ProofResultPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureRequestBody {
    #[serde(default)]
    pub content: Vec<AttributeDisjunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureClientRequest {
    #[serde(default)]
    pub validity: u64,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub data: Option<String>,
    pub request: DisclosureRequestBody,
}

impl ClientRequest for DisclosureClientRequest {
    fn content(&self) -> &[AttributeDisjunction] {
        &self.request.content
    }

    fn is_complete(&self) -> bool {
        true
    }

    fn validity_secs(&self) -> u64 {
        self.validity
    }

    fn set_validity_secs(&mut self, secs: u64) {
        self.validity = secs;
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout
    }

    fn set_timeout_secs(&mut self, secs: u64) {
        self.timeout = secs;
    }

    fn provider_data(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureProofRequest {
    pub content: Vec<AttributeDisjunction>,
    pub nonce: Nonce,
    pub context: Context,
}

impl ProofRequest for DisclosureProofRequest {
    fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureProofMaterial {
    #[serde(default)]
    pub disclosed: BTreeMap<AttributeId, String>,
    pub nonce: Nonce,
    pub context: Context,
    pub key_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureProofResult {
    pub status: ProofStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<AttributeId, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_provider_data: Option<String>,
}

impl ProofResultPayload for DisclosureProofResult {
    fn status(&self) -> ProofStatus {
        self.status
    }

    fn invalid() -> Self {
        Self {
            status: ProofStatus::Invalid,
            attributes: None,
            service_provider_data: None,
        }
    }

    fn waiting() -> Self {
        Self {
            status: ProofStatus::Waiting,
            ..Self::invalid()
        }
    }

    fn set_provider_data(&mut self, data: Option<String>) {
        self.service_provider_data = data;
    }
}

pub struct DisclosureFlavor;

impl Flavor for DisclosureFlavor {
    type ClientRequest = DisclosureClientRequest;
    type ProofRequest = DisclosureProofRequest;
    type ProofMaterial = DisclosureProofMaterial;
    type ProofResult = DisclosureProofResult;

    const NAME: &'static str = "disclosure";

    fn derive_proof_request(request: &Self::ClientRequest) -> Self::ProofRequest {
        DisclosureProofRequest {
            content: request.request.content.clone(),
            nonce: Nonce::random(),
            context: Context::random(),
        }
    }
}

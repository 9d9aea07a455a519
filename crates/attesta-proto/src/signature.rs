//! Signature session flavor: the client app produces an attribute-based
//! signature over a message supplied by the requesting party.

use std::collections::BTreeMap;

use attesta_core::{AttributeDisjunction, AttributeId, Context, Nonce, ProofStatus};
use serde::{Deserialize, Serialize};

use crate::flavor::{ClientRequest, Flavor, ProofRequest, ProofResultPayload};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Type of the message to be signed. Only literal strings are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "STRING")]
    String,
}

fn default_message_type() -> MessageType {
    MessageType::String
}

/// Inner body of a signature request: what must be attested, over which
/// message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequestBody {
    #[serde(default)]
    pub content: Vec<AttributeDisjunction>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
}

/// The signed payload the requesting party submits to open a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureClientRequest {
    /// Result validity in seconds; zero means "use the configured default".
    #[serde(default)]
    pub validity: u64,
    /// Session timeout in seconds; zero means "use the configured default".
    #[serde(default)]
    pub timeout: u64,
    /// Free-form service-provider data echoed back with the result.
    #[serde(default)]
    pub data: Option<String>,
    pub request: SignatureRequestBody,
}

impl ClientRequest for SignatureClientRequest {
    fn content(&self) -> &[AttributeDisjunction] {
        &self.request.content
    }

    fn is_complete(&self) -> bool {
        self.request.message.is_some()
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

/// The proof request handed to the client app: the content and message from
/// the client request plus a fresh nonce and context binding any produced
/// signature to this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProofRequest {
    pub content: Vec<AttributeDisjunction>,
    pub message: String,
    pub message_type: MessageType,
    pub nonce: Nonce,
    pub context: Context,
}

impl ProofRequest for SignatureProofRequest {
    fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    fn context(&self) -> &Context {
        &self.context
    }
}

// ---------------------------------------------------------------------------
// Proof material and result
// ---------------------------------------------------------------------------

/// Proof material submitted by the client app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProofMaterial {
    /// Attribute values the client chose to disclose.
    #[serde(default)]
    pub disclosed: BTreeMap<AttributeId, String>,
    /// Must equal the session's nonce; anything else is replay.
    pub nonce: Nonce,
    /// Must equal the session's context.
    pub context: Context,
    /// Identifies the issuer key attesting the disclosed attributes.
    pub key_id: String,
    /// Issuer signature over the canonical material bytes (hex).
    pub signature: String,
}

/// The attribute-based signature embedded in a verified result. Carries
/// everything needed to independently re-verify it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSignature {
    pub nonce: Option<Nonce>,
    pub context: Option<Context>,
    #[serde(default)]
    pub disclosed: BTreeMap<AttributeId, String>,
    pub key_id: Option<String>,
    pub signature: Option<String>,
}

/// Outcome of a signature session, fetched by the requesting party.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProofResult {
    pub status: ProofStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<AttributeSignature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<AttributeId, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_provider_data: Option<String>,
}

impl ProofResultPayload for SignatureProofResult {
    fn status(&self) -> ProofStatus {
        self.status
    }

    fn invalid() -> Self {
        Self {
            status: ProofStatus::Invalid,
            message: None,
            message_type: None,
            signature: None,
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

// ---------------------------------------------------------------------------
// Flavor wiring
// ---------------------------------------------------------------------------

pub struct SignatureFlavor;

impl Flavor for SignatureFlavor {
    type ClientRequest = SignatureClientRequest;
    type ProofRequest = SignatureProofRequest;
    type ProofMaterial = SignatureProofMaterial;
    type ProofResult = SignatureProofResult;

    const NAME: &'static str = "signature";

    fn derive_proof_request(request: &Self::ClientRequest) -> Self::ProofRequest {
        SignatureProofRequest {
            content: request.request.content.clone(),
            message: request.request.message.clone().unwrap_or_default(),
            message_type: request.request.message_type,
            nonce: Nonce::random(),
            context: Context::random(),
        }
    }
}

// ---------------------------------------------------------------------------
// Standalone signature re-verification
// ---------------------------------------------------------------------------

/// Re-verification of a previously issued attribute-based signature,
/// independent of any session.
pub trait SignatureVerifier: Send + Sync {
    /// Verify the embedded signature against the message. An `Err` is
    /// treated as an invalid signature by the caller.
    fn verify_signature(
        &self,
        signature: &AttributeSignature,
        message: &str,
    ) -> attesta_core::ApiResult<ProofStatus>;
}

/// Re-verify a previously issued signature result against its message.
///
/// Any structural mismatch (wrong message type, missing message, missing
/// signature or nonce/context) yields INVALID without consulting the
/// verifier, and verification faults are swallowed into INVALID. Never
/// fails toward the caller.
pub fn check_signature(
    verifier: &dyn SignatureVerifier,
    result: &SignatureProofResult,
) -> ProofStatus {
    let signature = match &result.signature {
        Some(s) => s,
        None => return ProofStatus::Invalid,
    };
    if result.message_type != Some(MessageType::String)
        || result.message.is_none()
        || signature.nonce.is_none()
        || signature.context.is_none()
        || signature.signature.is_none()
    {
        return ProofStatus::Invalid;
    }
    let message = result.message.as_deref().unwrap_or_default();
    match verifier.verify_signature(signature, message) {
        Ok(status) => status,
        Err(err) => {
            tracing::warn!(error = %err, "signature re-verification failed");
            ProofStatus::Invalid
        }
    }
}

//! Proof verification bound to the per-session nonce and context.
//!
//! Submitted proof material carries the attribute values the client chose
//! to disclose plus an attestor signature over those values and the
//! session's nonce and context. A proof is VALID only when the nonce and
//! context match the session, every requirement slot is covered, all
//! disclosed attributes belong to the named attestor, and the signature
//! verifies under the configured attestor key.

use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use attesta_core::{
    ApiError, ApiResult, AttributeDisjunction, AttributeId, Context, KeyLookup, Nonce, ProofStatus,
};
use attesta_proto::disclosure::{
    DisclosureFlavor, DisclosureProofMaterial, DisclosureProofRequest, DisclosureProofResult,
};
use attesta_proto::signature::{
    AttributeSignature, SignatureFlavor, SignatureProofMaterial, SignatureProofRequest,
    SignatureProofResult,
};
use attesta_proto::{ProofVerifier, SignatureVerifier};

/// Verifier resolving attestor keys from a fixed table.
pub struct BoundVerifier {
    attestors: Arc<dyn KeyLookup>,
}

impl BoundVerifier {
    pub fn new(attestors: Arc<dyn KeyLookup>) -> Self {
        Self { attestors }
    }

    fn check_bindings(
        &self,
        nonce: (&Nonce, &Nonce),
        context: (&Context, &Context),
        content: &[AttributeDisjunction],
        disclosed: &BTreeMap<AttributeId, String>,
        key_id: &str,
    ) -> ApiResult<VerifyingKey> {
        if nonce.0 != nonce.1 {
            return Err(ApiError::Internal("nonce does not match session".into()));
        }
        if context.0 != context.1 {
            return Err(ApiError::Internal("context does not match session".into()));
        }
        for disjunction in content {
            if !disclosed.keys().any(|a| disjunction.is_satisfied_by(a)) {
                return Err(ApiError::Internal(format!(
                    "requirement '{}' not satisfied",
                    disjunction.label
                )));
            }
        }
        for attribute in disclosed.keys() {
            if attribute.issuer_prefix() != key_id {
                return Err(ApiError::Internal(format!(
                    "attribute '{}' not attested by '{}'",
                    attribute, key_id
                )));
            }
        }
        let key_bytes = self
            .attestors
            .verifying_key(key_id)
            .ok_or_else(|| ApiError::Internal(format!("unknown attestor '{}'", key_id)))?;
        VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| ApiError::Internal("malformed attestor key".into()))
    }
}

/// Deterministic byte string the attestor signature covers: nonce, context,
/// the message (for signature sessions) and the disclosed pairs in sorted
/// order, newline-separated.
pub fn canonical_material(
    nonce: &Nonce,
    context: &Context,
    message: Option<&str>,
    disclosed: &BTreeMap<AttributeId, String>,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(nonce.as_str().as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(context.as_str().as_bytes());
    bytes.push(b'\n');
    if let Some(message) = message {
        bytes.extend_from_slice(message.as_bytes());
        bytes.push(b'\n');
    }
    for (attribute, value) in disclosed {
        bytes.extend_from_slice(attribute.as_str().as_bytes());
        bytes.push(b'=');
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(b'\n');
    }
    bytes
}

fn verify_over(key: &VerifyingKey, bytes: &[u8], signature_hex: &str) -> ApiResult<()> {
    let signature_bytes =
        hex::decode(signature_hex).map_err(|_| ApiError::Internal("invalid signature hex".into()))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|_| ApiError::Internal("malformed signature".into()))?;
    key.verify(bytes, &signature)
        .map_err(|_| ApiError::Internal("attestor signature verification failed".into()))
}

/// Attestor-side counterpart of the verification, used by test fixtures and
/// demo tooling to produce acceptable proof material.
pub fn attest(
    signing_key: &SigningKey,
    nonce: &Nonce,
    context: &Context,
    message: Option<&str>,
    disclosed: &BTreeMap<AttributeId, String>,
) -> String {
    let bytes = canonical_material(nonce, context, message, disclosed);
    hex::encode(signing_key.sign(&bytes).to_bytes())
}

impl ProofVerifier<SignatureFlavor> for BoundVerifier {
    fn verify(
        &self,
        material: &SignatureProofMaterial,
        request: &SignatureProofRequest,
    ) -> ApiResult<SignatureProofResult> {
        let key = self.check_bindings(
            (&material.nonce, &request.nonce),
            (&material.context, &request.context),
            &request.content,
            &material.disclosed,
            &material.key_id,
        )?;
        let bytes = canonical_material(
            &material.nonce,
            &material.context,
            Some(&request.message),
            &material.disclosed,
        );
        verify_over(&key, &bytes, &material.signature)?;

        Ok(SignatureProofResult {
            status: ProofStatus::Valid,
            message: Some(request.message.clone()),
            message_type: Some(request.message_type),
            signature: Some(AttributeSignature {
                nonce: Some(material.nonce.clone()),
                context: Some(material.context.clone()),
                disclosed: material.disclosed.clone(),
                key_id: Some(material.key_id.clone()),
                signature: Some(material.signature.clone()),
            }),
            attributes: Some(material.disclosed.clone()),
            service_provider_data: None,
        })
    }
}

impl ProofVerifier<DisclosureFlavor> for BoundVerifier {
    fn verify(
        &self,
        material: &DisclosureProofMaterial,
        request: &DisclosureProofRequest,
    ) -> ApiResult<DisclosureProofResult> {
        let key = self.check_bindings(
            (&material.nonce, &request.nonce),
            (&material.context, &request.context),
            &request.content,
            &material.disclosed,
            &material.key_id,
        )?;
        let bytes =
            canonical_material(&material.nonce, &material.context, None, &material.disclosed);
        verify_over(&key, &bytes, &material.signature)?;

        Ok(DisclosureProofResult {
            status: ProofStatus::Valid,
            attributes: Some(material.disclosed.clone()),
            service_provider_data: None,
        })
    }
}

impl SignatureVerifier for BoundVerifier {
    fn verify_signature(
        &self,
        signature: &AttributeSignature,
        message: &str,
    ) -> ApiResult<ProofStatus> {
        // check_signature already rejected results missing these fields.
        let (nonce, context, signature_hex, key_id) = match (
            &signature.nonce,
            &signature.context,
            &signature.signature,
            &signature.key_id,
        ) {
            (Some(n), Some(c), Some(s), Some(k)) => (n, c, s, k),
            _ => return Ok(ProofStatus::Invalid),
        };
        let key_bytes = self
            .attestors
            .verifying_key(key_id)
            .ok_or_else(|| ApiError::Internal(format!("unknown attestor '{}'", key_id)))?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| ApiError::Internal("malformed attestor key".into()))?;
        let bytes = canonical_material(nonce, context, Some(message), &signature.disclosed);
        verify_over(&key, &bytes, signature_hex)?;
        Ok(ProofStatus::Valid)
    }
}

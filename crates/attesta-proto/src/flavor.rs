//! The capability pair distinguishing the two session flavors.
//!
//! Signature and disclosure sessions run the exact same state machine; only
//! their payload types differ. A `Flavor` bundles those types so the
//! endpoint and the session store are written once.

use attesta_core::{ApiResult, AttributeDisjunction, Context, Nonce, ProofStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Payload-type bundle for one session flavor.
pub trait Flavor: Send + Sync + 'static {
    /// Signed request payload submitted by the requesting party.
    type ClientRequest: ClientRequest + Clone + Send + Sync + Serialize + DeserializeOwned + 'static;
    /// Derived proof request handed to the client app.
    type ProofRequest: ProofRequest + Clone + Send + Sync + Serialize + 'static;
    /// Proof material submitted by the client app. Opaque to the endpoint;
    /// only the verifier interprets it.
    type ProofMaterial: Send + Sync + DeserializeOwned + 'static;
    /// Result payload produced by the verifier.
    type ProofResult: ProofResultPayload + Clone + Send + Sync + Serialize + 'static;

    /// Flavor name used in logs.
    const NAME: &'static str;

    /// Derive the proof request from a validated client request, generating
    /// a fresh nonce and context.
    fn derive_proof_request(request: &Self::ClientRequest) -> Self::ProofRequest;
}

/// Accessors the endpoint needs on an inbound client request.
pub trait ClientRequest {
    fn content(&self) -> &[AttributeDisjunction];

    /// Whether all structurally required fields beyond `content` are
    /// present (the signature flavor requires a message).
    fn is_complete(&self) -> bool;

    fn validity_secs(&self) -> u64;
    fn set_validity_secs(&mut self, secs: u64);

    fn timeout_secs(&self) -> u64;
    fn set_timeout_secs(&mut self, secs: u64);

    /// Free-form service-provider data carried through to the result.
    fn provider_data(&self) -> Option<&str>;
}

/// Accessors on the derived proof request.
pub trait ProofRequest {
    fn nonce(&self) -> &Nonce;
    fn context(&self) -> &Context;
}

/// Accessors on the result payload.
pub trait ProofResultPayload {
    fn status(&self) -> ProofStatus;

    /// Result stored when verification fails or faults (fail-closed).
    fn invalid() -> Self;

    /// Placeholder returned while no proof has been submitted.
    fn waiting() -> Self;

    fn set_provider_data(&mut self, data: Option<String>);
}

/// The external proof system. Construction and verification of the actual
/// proofs is entirely behind this seam.
pub trait ProofVerifier<F: Flavor>: Send + Sync {
    /// Verify submitted proof material against the session's proof request.
    ///
    /// An `Err` here is treated by the endpoint exactly like an invalid
    /// proof; it never reaches the submitter.
    fn verify(
        &self,
        material: &F::ProofMaterial,
        request: &F::ProofRequest,
    ) -> ApiResult<F::ProofResult>;
}

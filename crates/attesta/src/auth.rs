//! Signed request envelopes for session creation.
//!
//! A requestor wraps its session request in a three-part envelope,
//! `base64url(header).base64url(payload).base64url(signature)`, where the
//! header names the Ed25519 key id and the signing time, and the signature
//! covers the first two parts. Only envelopes signed by a configured
//! requestor key open sessions.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use attesta_core::{
    ApiError, ApiResult, Authenticated, KeyLookup, RequestAuthenticator, Timestamp,
};

/// Envelope header: algorithm, signing key id, signing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub alg: String,
    pub kid: String,
    pub iat: u64,
}

/// Fixed key table loaded from configuration.
pub struct StaticKeys {
    keys: HashMap<String, [u8; 32]>,
}

impl StaticKeys {
    pub fn new(keys: HashMap<String, [u8; 32]>) -> Self {
        Self { keys }
    }
}

impl KeyLookup for StaticKeys {
    fn verifying_key(&self, key_id: &str) -> Option<[u8; 32]> {
        self.keys.get(key_id).copied()
    }
}

/// Validates request envelopes against a key table. The payload type is
/// chosen by the caller; the envelope itself is flavor-agnostic.
pub struct EnvelopeAuthenticator {
    keys: Arc<dyn KeyLookup>,
    max_age_secs: u64,
}

impl EnvelopeAuthenticator {
    pub fn new(keys: Arc<dyn KeyLookup>, max_age_secs: u64) -> Self {
        Self { keys, max_age_secs }
    }
}

impl<T: DeserializeOwned> RequestAuthenticator<T> for EnvelopeAuthenticator {
    fn authenticate(&self, raw: &str) -> ApiResult<Authenticated<T>> {
        let mut parts = raw.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => {
                    return Err(ApiError::AuthenticationFailed(
                        "envelope must have three parts".into(),
                    ))
                }
            };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| ApiError::AuthenticationFailed("invalid header encoding".into()))?;
        let header: EnvelopeHeader = serde_json::from_slice(&header_bytes)
            .map_err(|_| ApiError::AuthenticationFailed("invalid header".into()))?;

        if header.alg != "Ed25519" {
            return Err(ApiError::AuthenticationFailed(format!(
                "unsupported algorithm '{}'",
                header.alg
            )));
        }

        let key_bytes = self.keys.verifying_key(&header.kid).ok_or_else(|| {
            ApiError::AuthenticationFailed(format!("unknown key id '{}'", header.kid))
        })?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| ApiError::AuthenticationFailed("malformed verifying key".into()))?;

        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| ApiError::AuthenticationFailed("invalid signature encoding".into()))?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| ApiError::AuthenticationFailed("malformed signature".into()))?;

        let signed = format!("{}.{}", header_b64, payload_b64);
        key.verify(signed.as_bytes(), &signature)
            .map_err(|_| ApiError::AuthenticationFailed("signature verification failed".into()))?;

        let age = Timestamp::from_seconds(header.iat).age_secs(Timestamp::now());
        if age > self.max_age_secs {
            return Err(ApiError::AuthenticationFailed(format!(
                "envelope is {}s old, maximum is {}s",
                age, self.max_age_secs
            )));
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| ApiError::MalformedRequest)?;
        let payload: T =
            serde_json::from_slice(&payload_bytes).map_err(|_| ApiError::MalformedRequest)?;

        debug!(kid = %header.kid, age, "envelope accepted");
        Ok(Authenticated {
            payload,
            issuer: header.kid,
        })
    }
}

/// Produce a signed envelope over a JSON payload. Client-side counterpart
/// of [`EnvelopeAuthenticator`].
pub fn seal_envelope(signing_key: &SigningKey, kid: &str, payload_json: &str) -> String {
    seal_envelope_at(signing_key, kid, payload_json, Timestamp::now().seconds_since_epoch)
}

/// Like [`seal_envelope`] with an explicit signing time.
pub fn seal_envelope_at(
    signing_key: &SigningKey,
    kid: &str,
    payload_json: &str,
    iat: u64,
) -> String {
    let header = EnvelopeHeader {
        alg: "Ed25519".into(),
        kid: kid.into(),
        iat,
    };
    // Serializing a plain struct with string and integer fields cannot fail.
    let header_json = serde_json::to_string(&header).unwrap_or_default();
    let header_b64 = URL_SAFE_NO_PAD.encode(header_json.as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());
    let signed = format!("{}.{}", header_b64, payload_b64);
    let signature = signing_key.sign(signed.as_bytes());
    format!("{}.{}", signed, URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

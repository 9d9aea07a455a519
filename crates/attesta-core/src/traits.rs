use crate::error::ApiResult;
use crate::types::AttributeId;

// ---------------------------------------------------------------------------
// RequestAuthenticator — inbound signed-request validation
//
// Parsing and signature validation of the verifier's signed request is an
// external capability; the protocol core only consumes the authenticated
// payload and issuer identity.
// ---------------------------------------------------------------------------

/// An authenticated request payload together with the issuer that signed it.
#[derive(Debug, Clone)]
pub struct Authenticated<T> {
    pub payload: T,
    pub issuer: String,
}

pub trait RequestAuthenticator<T>: Send + Sync {
    /// Validate the raw signed request text and extract its payload.
    fn authenticate(&self, raw: &str) -> ApiResult<Authenticated<T>>;
}

// ---------------------------------------------------------------------------
// KeyLookup — signing-key resolution by key id
//
// Injected into authenticator implementations so key distribution stays
// pluggable rather than hardwired.
// ---------------------------------------------------------------------------

pub trait KeyLookup: Send + Sync {
    /// Resolve an Ed25519 verifying key (raw 32 bytes) for a key id.
    fn verifying_key(&self, key_id: &str) -> Option<[u8; 32]>;
}

// ---------------------------------------------------------------------------
// AttributeScheme — the set of attributes that exist
// ---------------------------------------------------------------------------

pub trait AttributeScheme: Send + Sync {
    /// Whether the attribute is known to the active scheme.
    fn knows(&self, attribute: &AttributeId) -> bool;
}

// ---------------------------------------------------------------------------
// PolicyStore — per-issuer request permissions
// ---------------------------------------------------------------------------

pub trait PolicyStore: Send + Sync {
    /// Whether the issuer may request possession of the attribute.
    fn is_authorized(&self, issuer: &str, attribute: &AttributeId) -> bool;
}

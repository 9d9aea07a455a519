use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ---------------------------------------------------------------------------
// AttributeId — dotted attribute identifier
//
// `scheme.issuer.credential` names a credential type; a fourth segment names
// a single attribute within it. Requests may reference either level.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeId(String);

impl AttributeId {
    /// Parse a dotted identifier. Three segments address a credential,
    /// four address an attribute within it. Segments must be non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let segments: Vec<&str> = s.split('.').collect();
        if !(3..=4).contains(&segments.len()) {
            return None;
        }
        if segments.iter().any(|seg| seg.is_empty()) {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `scheme.issuer` prefix identifying the attesting issuer.
    pub fn issuer_prefix(&self) -> &str {
        let mut dots = self.0.match_indices('.');
        let _ = dots.next();
        match dots.next() {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// The `scheme.issuer.credential` prefix.
    pub fn credential_prefix(&self) -> &str {
        let mut dots = self.0.match_indices('.');
        let _ = dots.next();
        let _ = dots.next();
        match dots.next() {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AttributeDisjunction — one requirement slot
// ---------------------------------------------------------------------------

/// A set of alternative attribute identifiers; disclosing any one of them
/// satisfies this slot of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDisjunction {
    /// Human-readable label shown to the end user.
    pub label: String,
    /// Alternatives, any one of which satisfies the slot.
    pub attributes: Vec<AttributeId>,
}

impl AttributeDisjunction {
    pub fn new(label: impl Into<String>, attributes: Vec<AttributeId>) -> Self {
        Self {
            label: label.into(),
            attributes,
        }
    }

    /// Whether the given attribute satisfies this slot.
    pub fn is_satisfied_by(&self, attribute: &AttributeId) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }
}

// ---------------------------------------------------------------------------
// SessionToken — opaque session handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh token: SHA-256 over 32 random bytes plus the current
    /// time, hex-encoded. Collision probability is negligible.
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(random_bytes);
        hasher.update(Timestamp::now().seconds_since_epoch.to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Nonce / Context — per-session replay protection values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Fresh random nonce (hex-encoded, 32 bytes).
    pub fn random() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(String);

impl Context {
    /// Fresh random context (hex-encoded, 32 bytes).
    pub fn random() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionStatus — the session state machine's states
// ---------------------------------------------------------------------------

/// Session lifecycle status. CANCELLED and DONE are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Created, not yet fetched by the client app.
    Initialized,
    /// The client app has fetched the proof request.
    Connected,
    /// The requesting party cancelled the session.
    Cancelled,
    /// A proof was submitted and processed.
    Done,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Cancelled | SessionStatus::Done)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initialized => "INITIALIZED",
            SessionStatus::Connected => "CONNECTED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// ProofStatus — coarse proof outcome
//
// Only the coarse status ever crosses the wire; verification internals are
// never surfaced.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofStatus {
    /// The proof verified against the session's proof request.
    Valid,
    /// The proof failed verification or was malformed in any way.
    Invalid,
    /// No proof has been submitted yet (result placeholder).
    Waiting,
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProofStatus::Valid => "VALID",
            ProofStatus::Invalid => "INVALID",
            ProofStatus::Waiting => "WAITING",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Timestamp — seconds since the Unix epoch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            seconds_since_epoch: chrono::Utc::now().timestamp().max(0) as u64,
        }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
        }
    }

    /// Seconds elapsed between `self` and `now` (zero if `self` is later).
    pub fn age_secs(&self, now: Timestamp) -> u64 {
        now.seconds_since_epoch
            .saturating_sub(self.seconds_since_epoch)
    }
}

use thiserror::Error;

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by the session entity and store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Unknown, expired, or already-closed token.
    #[error("session not found")]
    NotFound,

    /// A freshly generated token collided with a live session. Tokens carry
    /// 256 bits of entropy, so this indicates a programmer error.
    #[error("session token collision")]
    TokenCollision,

    /// A result was already stored for this session.
    #[error("result already set")]
    ResultAlreadySet,
}

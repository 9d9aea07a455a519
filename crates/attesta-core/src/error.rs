//! Protocol error taxonomy.
//!
//! Display strings intentionally omit verification internals; a failing
//! proof is only ever reported as INVALID, never with a reason.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the session protocol.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Structurally invalid create payload (empty content, missing message).
    #[error("malformed request")]
    MalformedRequest,

    /// The request references an attribute unknown to the active scheme.
    #[error("unknown attribute requested")]
    AttributesWrong,

    /// The requesting issuer lacks permission for the named attribute.
    /// The identifier is included for diagnostics on the verifier side.
    #[error("unauthorized to request attribute: {0}")]
    Unauthorized(String),

    /// Unknown, expired, or already-closed session token.
    #[error("session not found")]
    SessionNotFound,

    /// The inbound signed request failed authentication.
    #[error("request authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Internal fault not attributable to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable wire identifier for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedRequest => "MALFORMED_REQUEST",
            ApiError::AttributesWrong => "ATTRIBUTES_WRONG",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::SessionNotFound => "SESSION_NOT_FOUND",
            ApiError::AuthenticationFailed(_) => "AUTH_ERROR",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_variants_display() {
        let errors: Vec<ApiError> = vec![
            ApiError::MalformedRequest,
            ApiError::AttributesWrong,
            ApiError::Unauthorized("demo.acme.id.name".into()),
            ApiError::SessionNotFound,
            ApiError::AuthenticationFailed("bad signature".into()),
            ApiError::Internal("test".into()),
        ];
        for err in &errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(ApiError::MalformedRequest.code(), "MALFORMED_REQUEST");
        assert_eq!(ApiError::AttributesWrong.code(), "ATTRIBUTES_WRONG");
        assert_eq!(ApiError::Unauthorized("x".into()).code(), "UNAUTHORIZED");
        assert_eq!(ApiError::SessionNotFound.code(), "SESSION_NOT_FOUND");
        assert_eq!(
            ApiError::AuthenticationFailed("x".into()).code(),
            "AUTH_ERROR"
        );
    }

    #[test]
    fn test_unauthorized_carries_identifier() {
        let err = ApiError::Unauthorized("demo.acme.id.over18".into());
        assert!(err.to_string().contains("demo.acme.id.over18"));
    }

    #[test]
    fn test_session_not_found_has_no_detail() {
        assert_eq!(ApiError::SessionNotFound.to_string(), "session not found");
    }
}

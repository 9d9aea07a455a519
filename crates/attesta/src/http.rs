//! Axum HTTP surface for the session server.
//!
//! The signature flavor lives under `/signature`, the disclosure flavor
//! under `/verification`. Both expose the same handshake: create, fetch
//! request, status (with optional long-poll), submit proofs, collect
//! result, delete.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use attesta_core::{ApiError, ApiResult, SessionToken};
use attesta_proto::disclosure::DisclosureProofMaterial;
use attesta_proto::signature::{SignatureProofMaterial, SignatureProofResult};
use attesta_proto::{
    check_signature, DisclosureFlavor, ResourceConfig, SessionResource, SignatureFlavor,
};
use attesta_session::SessionStore;

use crate::auth::{EnvelopeAuthenticator, StaticKeys};
use crate::config::{decode_key, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::policy::ConfiguredPolicy;
use crate::verifier::BoundVerifier;

/// Shared application state for the Axum handlers.
pub struct AppState {
    pub signature: SessionResource<SignatureFlavor>,
    pub disclosure: SessionResource<DisclosureFlavor>,
    pub verifier: Arc<BoundVerifier>,
    pub sweep_interval_secs: u64,
}

impl AppState {
    /// Wire up both session flavors from the server configuration.
    pub fn from_config(config: &ServerConfig) -> ServerResult<Arc<Self>> {
        let mut requestor_keys = std::collections::HashMap::new();
        for requestor in &config.requestors {
            let key = decode_key(&requestor.key).map_err(|e| {
                ServerError::Config(format!("requestor '{}': {}", requestor.name, e))
            })?;
            requestor_keys.insert(requestor.name.clone(), key);
        }
        let mut attestor_keys = std::collections::HashMap::new();
        for attestor in &config.attestors {
            let key = decode_key(&attestor.key).map_err(|e| {
                ServerError::Config(format!("attestor '{}': {}", attestor.key_id, e))
            })?;
            attestor_keys.insert(attestor.key_id.clone(), key);
        }

        let authenticator = Arc::new(EnvelopeAuthenticator::new(
            Arc::new(StaticKeys::new(requestor_keys)),
            config.max_request_age_secs,
        ));
        let policy = Arc::new(ConfiguredPolicy::from_config(config)?);
        let verifier = Arc::new(BoundVerifier::new(Arc::new(StaticKeys::new(
            attestor_keys,
        ))));
        let resource_config = ResourceConfig {
            default_validity_secs: config.default_validity_secs,
            default_timeout_secs: config.default_session_timeout_secs,
            max_poll_wait_secs: config.max_poll_wait_secs,
        };

        Ok(Arc::new(Self {
            signature: SessionResource::new(
                Arc::new(SessionStore::new()),
                authenticator.clone(),
                policy.clone(),
                policy.clone(),
                verifier.clone(),
                resource_config.clone(),
            ),
            disclosure: SessionResource::new(
                Arc::new(SessionStore::new()),
                authenticator,
                policy.clone(),
                policy,
                verifier.clone(),
                resource_config,
            ),
            verifier,
            sweep_interval_secs: config.sweep_interval_secs,
        }))
    }
}

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/signature", post(create_signature))
        .route("/signature/checksignature", post(check_issued_signature))
        .route(
            "/signature/{token}",
            get(signature_request).delete(delete_signature),
        )
        .route("/signature/{token}/jwt", get(signature_raw_request))
        .route("/signature/{token}/status", get(signature_status))
        .route("/signature/{token}/proofs", post(signature_proofs))
        .route(
            "/signature/{token}/getunsignedproof",
            get(signature_result),
        )
        .route("/verification", post(create_disclosure))
        .route(
            "/verification/{token}",
            get(disclosure_request).delete(delete_disclosure),
        )
        .route("/verification/{token}/jwt", get(disclosure_raw_request))
        .route("/verification/{token}/status", get(disclosure_status))
        .route("/verification/{token}/proofs", post(disclosure_proofs))
        .route("/verification/{token}/getproof", get(disclosure_result))
        .route("/health", get(health))
        .with_state(state)
}

/// Spawn the periodic expired-session sweep.
pub fn spawn_sweeper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(state.sweep_interval_secs));
        loop {
            interval.tick().await;
            let removed = state.signature.store().sweep() + state.disclosure.store().sweep();
            if removed > 0 {
                debug!(removed, "expired sessions swept");
            }
        }
    })
}

fn error_response(err: ApiError) -> Response {
    let status = match &err {
        ApiError::MalformedRequest | ApiError::AttributesWrong => StatusCode::BAD_REQUEST,
        ApiError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
        ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
        ApiError::SessionNotFound => StatusCode::NOT_FOUND,
        ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({
            "error": err.code(),
            "message": err.to_string(),
        })),
    )
        .into_response()
}

fn respond<T: Serialize>(result: ApiResult<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    /// Long-poll for up to this many seconds.
    wait: Option<u64>,
}

// ---------------------------------------------------------------------------
// Signature endpoints
// ---------------------------------------------------------------------------

/// POST /signature -- open a session from a signed request envelope
async fn create_signature(State(state): State<Arc<AppState>>, body: String) -> Response {
    respond(state.signature.create(&body))
}

/// GET /signature/:token -- client app fetches the proof request
async fn signature_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    respond(state.signature.fetch_request(&SessionToken::new(token)))
}

/// GET /signature/:token/jwt -- proof request plus the original envelope
async fn signature_raw_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    respond(
        state
            .signature
            .fetch_request_with_raw(&SessionToken::new(token)),
    )
}

/// GET /signature/:token/status -- current status, optionally long-polled
async fn signature_status(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let token = SessionToken::new(token);
    match query.wait {
        Some(secs) => respond(
            state
                .signature
                .wait_status(&token, Duration::from_secs(secs))
                .await,
        ),
        None => respond(state.signature.poll_status(&token)),
    }
}

/// POST /signature/:token/proofs -- client app submits proof material
async fn signature_proofs(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(material): Json<SignatureProofMaterial>,
) -> Response {
    respond(
        state
            .signature
            .submit_proof(&SessionToken::new(token), &material),
    )
}

/// GET /signature/:token/getunsignedproof -- requestor collects the result
async fn signature_result(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    respond(state.signature.fetch_result(&SessionToken::new(token)))
}

/// DELETE /signature/:token -- requestor abandons the session
async fn delete_signature(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.signature.delete(&SessionToken::new(token)) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /signature/checksignature -- re-verify a previously issued result
async fn check_issued_signature(
    State(state): State<Arc<AppState>>,
    Json(result): Json<SignatureProofResult>,
) -> Response {
    let status = check_signature(state.verifier.as_ref(), &result);
    (StatusCode::OK, Json(status)).into_response()
}

// ---------------------------------------------------------------------------
// Disclosure endpoints
// ---------------------------------------------------------------------------

/// POST /verification -- open a session from a signed request envelope
async fn create_disclosure(State(state): State<Arc<AppState>>, body: String) -> Response {
    respond(state.disclosure.create(&body))
}

/// GET /verification/:token -- client app fetches the proof request
async fn disclosure_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    respond(state.disclosure.fetch_request(&SessionToken::new(token)))
}

/// GET /verification/:token/jwt -- proof request plus the original envelope
async fn disclosure_raw_request(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    respond(
        state
            .disclosure
            .fetch_request_with_raw(&SessionToken::new(token)),
    )
}

/// GET /verification/:token/status -- current status, optionally long-polled
async fn disclosure_status(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let token = SessionToken::new(token);
    match query.wait {
        Some(secs) => respond(
            state
                .disclosure
                .wait_status(&token, Duration::from_secs(secs))
                .await,
        ),
        None => respond(state.disclosure.poll_status(&token)),
    }
}

/// POST /verification/:token/proofs -- client app submits proof material
async fn disclosure_proofs(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(material): Json<DisclosureProofMaterial>,
) -> Response {
    respond(
        state
            .disclosure
            .submit_proof(&SessionToken::new(token), &material),
    )
}

/// GET /verification/:token/getproof -- requestor collects the result
async fn disclosure_result(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    respond(state.disclosure.fetch_result(&SessionToken::new(token)))
}

/// DELETE /verification/:token -- requestor abandons the session
async fn delete_disclosure(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.disclosure.delete(&SessionToken::new(token)) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /health -- server info
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "signature_sessions": state.signature.store().len(),
        "disclosure_sessions": state.disclosure.store().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::seal_envelope;
    use crate::config::{AttestorConfig, RequestorConfig};
    use crate::verifier::attest;
    use attesta_core::{AttributeId, ProofStatus, SessionStatus};
    use attesta_proto::signature::SignatureProofRequest;
    use attesta_proto::SessionPointer;
    use axum::body::Body;
    use axum::http::Request;
    use ed25519_dalek::SigningKey;
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn requestor_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn attestor_key() -> SigningKey {
        SigningKey::from_bytes(&[3u8; 32])
    }

    fn test_state() -> Arc<AppState> {
        let mut config = ServerConfig::default();
        config.scheme.attributes = vec![
            "demo.acme.id.name".into(),
            "demo.acme.id.over18".into(),
        ];
        config.requestors = vec![RequestorConfig {
            name: "webshop".into(),
            key: hex::encode(requestor_key().verifying_key().to_bytes()),
            authorized: vec!["demo.acme.*".into()],
        }];
        config.attestors = vec![AttestorConfig {
            key_id: "demo.acme".into(),
            key: hex::encode(attestor_key().verifying_key().to_bytes()),
        }];
        AppState::from_config(&config).unwrap()
    }

    fn signature_envelope() -> String {
        let payload = r#"{"data": "order-17", "request": {"content": [{"label": "Name", "attributes": ["demo.acme.id.name"]}], "message": "pay 25 euro"}}"#;
        seal_envelope(&requestor_key(), "webshop", payload)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        router: &Router,
        request: Request<Body>,
        expected: StatusCode,
    ) -> T {
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn create_session(router: &Router) -> SessionPointer {
        let req = Request::builder()
            .method("POST")
            .uri("/signature")
            .header("content-type", "text/plain")
            .body(Body::from(signature_envelope()))
            .unwrap();
        request_json(router, req, StatusCode::OK).await
    }

    #[tokio::test]
    async fn test_create_returns_pointer() {
        let router = build_router(test_state());
        let pointer = create_session(&router).await;
        assert_eq!(pointer.protocol_version, "2.0");
        assert_eq!(pointer.api_version, "2.1");
    }

    #[tokio::test]
    async fn test_create_bad_signature_is_401() {
        let router = build_router(test_state());
        let forger = SigningKey::from_bytes(&[9u8; 32]);
        let envelope = seal_envelope(&forger, "webshop", "{}");
        let req = Request::builder()
            .method("POST")
            .uri("/signature")
            .body(Body::from(envelope))
            .unwrap();
        let body: serde_json::Value =
            request_json(&router, req, StatusCode::UNAUTHORIZED).await;
        assert_eq!(body["error"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn test_create_unauthorized_attribute_is_403() {
        // Known to the scheme, but webshop is only authorized for demo.acme.*
        let mut config = ServerConfig::default();
        config.scheme.attributes = vec!["demo.gov.id.bsn".into()];
        config.requestors = vec![RequestorConfig {
            name: "webshop".into(),
            key: hex::encode(requestor_key().verifying_key().to_bytes()),
            authorized: vec!["demo.acme.*".into()],
        }];
        let router = build_router(AppState::from_config(&config).unwrap());

        let payload = r#"{"request": {"content": [{"label": "BSN", "attributes": ["demo.gov.id.bsn"]}], "message": "m"}}"#;
        let envelope = seal_envelope(&requestor_key(), "webshop", payload);
        let body: serde_json::Value =
            request_json(&router, post("/signature", envelope), StatusCode::FORBIDDEN).await;
        assert_eq!(body["error"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_unknown_token_is_404() {
        let router = build_router(test_state());
        let body: serde_json::Value = request_json(
            &router,
            get_req("/signature/deadbeef/status"),
            StatusCode::NOT_FOUND,
        )
        .await;
        assert_eq!(body["error"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_full_signature_flow_over_http() {
        let router = build_router(test_state());
        let pointer = create_session(&router).await;
        let token = pointer.token.as_str();

        let status: SessionStatus = request_json(
            &router,
            get_req(&format!("/signature/{}/status", token)),
            StatusCode::OK,
        )
        .await;
        assert_eq!(status, SessionStatus::Initialized);

        let proof_request: SignatureProofRequest = request_json(
            &router,
            get_req(&format!("/signature/{}", token)),
            StatusCode::OK,
        )
        .await;
        assert_eq!(proof_request.message, "pay 25 euro");

        let disclosed = BTreeMap::from([(
            AttributeId::parse("demo.acme.id.name").unwrap(),
            "Ada".to_string(),
        )]);
        let material = SignatureProofMaterial {
            signature: attest(
                &attestor_key(),
                &proof_request.nonce,
                &proof_request.context,
                Some(&proof_request.message),
                &disclosed,
            ),
            disclosed,
            nonce: proof_request.nonce.clone(),
            context: proof_request.context.clone(),
            key_id: "demo.acme".into(),
        };
        let proof_status: ProofStatus = request_json(
            &router,
            post(
                &format!("/signature/{}/proofs", token),
                serde_json::to_string(&material).unwrap(),
            ),
            StatusCode::OK,
        )
        .await;
        assert_eq!(proof_status, ProofStatus::Valid);

        let status: SessionStatus = request_json(
            &router,
            get_req(&format!("/signature/{}/status", token)),
            StatusCode::OK,
        )
        .await;
        assert_eq!(status, SessionStatus::Done);

        let result: SignatureProofResult = request_json(
            &router,
            get_req(&format!("/signature/{}/getunsignedproof", token)),
            StatusCode::OK,
        )
        .await;
        assert_eq!(result.status, ProofStatus::Valid);
        assert_eq!(result.service_provider_data.as_deref(), Some("order-17"));

        // The result is consumed exactly once.
        let body: serde_json::Value = request_json(
            &router,
            get_req(&format!("/signature/{}/getunsignedproof", token)),
            StatusCode::NOT_FOUND,
        )
        .await;
        assert_eq!(body["error"], "SESSION_NOT_FOUND");

        // The issued signature re-verifies out of session.
        let check: ProofStatus = request_json(
            &router,
            post(
                "/signature/checksignature",
                serde_json::to_string(&result).unwrap(),
            ),
            StatusCode::OK,
        )
        .await;
        assert_eq!(check, ProofStatus::Valid);
    }

    #[tokio::test]
    async fn test_result_waiting_before_proof() {
        let router = build_router(test_state());
        let pointer = create_session(&router).await;
        let result: SignatureProofResult = request_json(
            &router,
            get_req(&format!("/signature/{}/getunsignedproof", pointer.token)),
            StatusCode::OK,
        )
        .await;
        assert_eq!(result.status, ProofStatus::Waiting);
    }

    #[tokio::test]
    async fn test_delete_then_status_is_404() {
        let router = build_router(test_state());
        let pointer = create_session(&router).await;

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/signature/{}", pointer.token))
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = request_json(
            &router,
            get_req(&format!("/signature/{}/status", pointer.token)),
            StatusCode::NOT_FOUND,
        )
        .await;
        assert_eq!(body["error"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_disclosure_flow_over_http() {
        let router = build_router(test_state());
        let payload = r#"{"request": {"content": [{"label": "Age", "attributes": ["demo.acme.id.over18"]}]}}"#;
        let envelope = seal_envelope(&requestor_key(), "webshop", payload);
        let pointer: SessionPointer =
            request_json(&router, post("/verification", envelope), StatusCode::OK).await;

        let proof_request: attesta_proto::disclosure::DisclosureProofRequest = request_json(
            &router,
            get_req(&format!("/verification/{}", pointer.token)),
            StatusCode::OK,
        )
        .await;

        let disclosed = BTreeMap::from([(
            AttributeId::parse("demo.acme.id.over18").unwrap(),
            "yes".to_string(),
        )]);
        let material = DisclosureProofMaterial {
            signature: attest(
                &attestor_key(),
                &proof_request.nonce,
                &proof_request.context,
                None,
                &disclosed,
            ),
            disclosed,
            nonce: proof_request.nonce.clone(),
            context: proof_request.context.clone(),
            key_id: "demo.acme".into(),
        };
        let proof_status: ProofStatus = request_json(
            &router,
            post(
                &format!("/verification/{}/proofs", pointer.token),
                serde_json::to_string(&material).unwrap(),
            ),
            StatusCode::OK,
        )
        .await;
        assert_eq!(proof_status, ProofStatus::Valid);

        let result: attesta_proto::disclosure::DisclosureProofResult = request_json(
            &router,
            get_req(&format!("/verification/{}/getproof", pointer.token)),
            StatusCode::OK,
        )
        .await;
        assert_eq!(result.status, ProofStatus::Valid);
    }

    #[tokio::test]
    async fn test_health_reports_session_counts() {
        let router = build_router(test_state());
        create_session(&router).await;
        let health: serde_json::Value =
            request_json(&router, get_req("/health"), StatusCode::OK).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["signature_sessions"], 1);
        assert_eq!(health["disclosure_sessions"], 0);
    }
}

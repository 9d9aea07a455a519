//! The protocol endpoint: one handshake state machine per session flavor.
//!
//! Operation flow between the three parties:
//!
//! 1. the requesting party opens a session with a signed request (`create`),
//! 2. the client app fetches the proof request (`fetch_request`), which
//!    flips the session to CONNECTED,
//! 3. the client app submits proof material (`submit_proof`); the external
//!    verifier produces a result and the session flips to DONE,
//! 4. the requesting party polls status and collects the result
//!    (`poll_status` / `fetch_result`), after which the session is closed.
//!
//! Cancellation (`delete`) and expiry can cut the flow short at any point.

use std::sync::Arc;
use std::time::Duration;

use attesta_core::{
    ApiError, ApiResult, AttributeScheme, Authenticated, Context, Nonce, PolicyStore, ProofStatus,
    RequestAuthenticator, SessionStatus, SessionToken, Timestamp,
};
use attesta_session::{Session, SessionError, SessionStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::flavor::{ClientRequest, Flavor, ProofRequest, ProofResultPayload, ProofVerifier};

/// Protocol version spoken between server and client app.
pub const PROTOCOL_VERSION: &str = "2.0";
/// Version of this HTTP API surface.
pub const API_VERSION: &str = "2.1";

// ---------------------------------------------------------------------------
// Wire types shared by both flavors
// ---------------------------------------------------------------------------

/// Token-bearing session reference returned to the requesting party.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPointer {
    pub protocol_version: String,
    pub api_version: String,
    pub token: SessionToken,
}

impl SessionPointer {
    fn new(token: SessionToken) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.into(),
            api_version: API_VERSION.into(),
            token,
        }
    }
}

/// The original signed request text plus the session's nonce and context,
/// for client apps that independently re-verify the inbound signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionRequest {
    pub raw_request: String,
    pub nonce: Nonce,
    pub context: Context,
}

/// Read-only configuration injected at construction; never reloaded per call.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Default result validity when the client request leaves it unset.
    pub default_validity_secs: u64,
    /// Default session timeout when the client request leaves it unset.
    pub default_timeout_secs: u64,
    /// Upper bound on a single status long-poll.
    pub max_poll_wait_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            default_validity_secs: 3600,
            default_timeout_secs: 600,
            max_poll_wait_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionResource — the handshake endpoint
// ---------------------------------------------------------------------------

pub struct SessionResource<F: Flavor> {
    store: Arc<SessionStore<F::ProofRequest, F::ProofResult>>,
    authenticator: Arc<dyn RequestAuthenticator<F::ClientRequest>>,
    scheme: Arc<dyn AttributeScheme>,
    policy: Arc<dyn PolicyStore>,
    verifier: Arc<dyn ProofVerifier<F>>,
    config: ResourceConfig,
}

impl<F: Flavor> SessionResource<F> {
    pub fn new(
        store: Arc<SessionStore<F::ProofRequest, F::ProofResult>>,
        authenticator: Arc<dyn RequestAuthenticator<F::ClientRequest>>,
        scheme: Arc<dyn AttributeScheme>,
        policy: Arc<dyn PolicyStore>,
        verifier: Arc<dyn ProofVerifier<F>>,
        config: ResourceConfig,
    ) -> Self {
        Self {
            store,
            authenticator,
            scheme,
            policy,
            verifier,
            config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore<F::ProofRequest, F::ProofResult>> {
        &self.store
    }

    /// Open a new session from a signed client request. The only creation
    /// path: no session exists without passing authentication, the scheme
    /// check, and the policy check.
    pub fn create(&self, raw: &str) -> ApiResult<SessionPointer> {
        let Authenticated {
            mut payload,
            issuer,
        } = self.authenticator.authenticate(raw)?;

        if payload.content().is_empty() || !payload.is_complete() {
            return Err(ApiError::MalformedRequest);
        }

        for disjunction in payload.content() {
            for attribute in &disjunction.attributes {
                if !self.scheme.knows(attribute) {
                    return Err(ApiError::AttributesWrong);
                }
            }
        }

        // Fail fast on the first attribute this issuer may not request.
        for disjunction in payload.content() {
            for attribute in &disjunction.attributes {
                if !self.policy.is_authorized(&issuer, attribute) {
                    return Err(ApiError::Unauthorized(attribute.to_string()));
                }
            }
        }

        if payload.validity_secs() == 0 {
            payload.set_validity_secs(self.config.default_validity_secs);
        }
        if payload.timeout_secs() == 0 {
            payload.set_timeout_secs(self.config.default_timeout_secs);
        }

        let proof_request = F::derive_proof_request(&payload);
        let session = Session::new(
            raw,
            proof_request,
            payload.provider_data().map(String::from),
            payload.timeout_secs(),
        );
        let handle = self
            .store
            .add(session)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        info!(flavor = F::NAME, token = %handle.token(), %issuer, "session created");
        Ok(SessionPointer::new(handle.token().clone()))
    }

    /// Client app fetches the proof request. First fetch flips the session
    /// from INITIALIZED to CONNECTED; later fetches leave the status alone.
    pub fn fetch_request(&self, token: &SessionToken) -> ApiResult<F::ProofRequest> {
        let handle = self.get(token)?;
        debug!(flavor = F::NAME, %token, "proof request fetched");
        Ok(handle.with(|s| {
            s.connect();
            s.proof_request().clone()
        }))
    }

    /// Variant of `fetch_request` also returning the original signed request
    /// text verbatim, plus the nonce and context. Same status side effect.
    pub fn fetch_request_with_raw(&self, token: &SessionToken) -> ApiResult<RawSessionRequest> {
        let handle = self.get(token)?;
        Ok(handle.with(|s| {
            s.connect();
            RawSessionRequest {
                raw_request: s.raw_request().to_string(),
                nonce: s.proof_request().nonce().clone(),
                context: s.proof_request().context().clone(),
            }
        }))
    }

    /// Current session status. Observing CANCELLED closes the session: the
    /// party that cancelled has now been seen to be informed, so nothing
    /// waits on it any longer.
    pub fn poll_status(&self, token: &SessionToken) -> ApiResult<SessionStatus> {
        let handle = self.get(token)?;
        let status = handle.status();
        if status == SessionStatus::Cancelled {
            self.store.remove(token);
        }
        Ok(status)
    }

    /// Long-poll variant: suspend until the next status transition or until
    /// `wait` elapses (bounded by the configured maximum). Same CANCELLED
    /// close-on-observation side effect as `poll_status`.
    pub async fn wait_status(
        &self,
        token: &SessionToken,
        wait: Duration,
    ) -> ApiResult<SessionStatus> {
        let handle = self.get(token)?;
        let wait = wait.min(Duration::from_secs(self.config.max_poll_wait_secs));
        let status = handle.wait_for_transition(wait).await;
        // The session may have timed out while this poll was suspended, in
        // which case the sweeper (or the next lookup) removes it. A status
        // read across expiry must not leak out.
        if handle.is_expired(Timestamp::now()) {
            self.store.remove(token);
            return Err(ApiError::SessionNotFound);
        }
        if status == SessionStatus::Cancelled {
            self.store.remove(token);
        }
        Ok(status)
    }

    /// Client app submits proof material. The verifier runs under the
    /// session lock, so racing submissions serialize and at most one result
    /// is ever stored; a duplicate submission returns the stored outcome
    /// without re-verifying. Verification failures of any kind are stored
    /// as INVALID and never propagated (fail-closed); only the coarse
    /// status goes back to the submitter.
    pub fn submit_proof(
        &self,
        token: &SessionToken,
        material: &F::ProofMaterial,
    ) -> ApiResult<ProofStatus> {
        let handle = self.get(token)?;
        let status = handle.with(|s| {
            if s.status() == SessionStatus::Cancelled {
                return Err(ApiError::SessionNotFound);
            }
            if let Some(existing) = s.result() {
                return Ok(existing.status());
            }
            let result = match self.verifier.verify(material, s.proof_request()) {
                Ok(result) => result,
                Err(err) => {
                    // Everything has to be exactly right; any irregularity
                    // means the proof is not accepted.
                    warn!(flavor = F::NAME, %token, error = %err, "proof rejected");
                    F::ProofResult::invalid()
                }
            };
            let status = result.status();
            // The empty-result check above ran under this same lock.
            let _ = s.set_result(result);
            Ok(status)
        })?;

        info!(flavor = F::NAME, %token, %status, "proof processed");
        Ok(status)
    }

    /// Requesting party collects the result. Before a proof arrives this is
    /// a WAITING placeholder, not an error. A real result is consumed
    /// exactly once: returning it closes the session.
    pub fn fetch_result(&self, token: &SessionToken) -> ApiResult<F::ProofResult> {
        let handle = self.get(token)?;
        let (result, done) = handle.with(|s| {
            let mut result = match s.result() {
                Some(result) => result.clone(),
                None => F::ProofResult::waiting(),
            };
            result.set_provider_data(s.provider_data().map(String::from));
            let done = s.result().is_some();
            (result, done)
        });
        if done {
            self.store.remove(token);
            debug!(flavor = F::NAME, %token, "result collected, session closed");
        }
        Ok(result)
    }

    /// Requesting party abandons the session. The session is flipped to
    /// CANCELLED, which wakes any suspended status long-poll. For a
    /// CONNECTED session with a long-poll in flight, physical removal is
    /// deferred to that poll's close-on-observation; in every other state
    /// the session closes immediately.
    pub fn delete(&self, token: &SessionToken) -> ApiResult<()> {
        let handle = self.get(token)?;
        let close_now = handle.with(|s| {
            let was_connected = s.status() == SessionStatus::Connected;
            s.cancel();
            !(was_connected && s.listener_attached())
        });
        if close_now {
            self.store.remove(token);
        }
        info!(flavor = F::NAME, %token, deferred = !close_now, "session cancelled");
        Ok(())
    }

    fn get(
        &self,
        token: &SessionToken,
    ) -> ApiResult<Arc<attesta_session::SessionHandle<F::ProofRequest, F::ProofResult>>> {
        self.store.get(token).map_err(|e| match e {
            SessionError::NotFound => ApiError::SessionNotFound,
            other => ApiError::Internal(other.to_string()),
        })
    }
}

//! The session entity and its status state machine.
//!
//! One generic entity serves both session flavors; `R` is the derived proof
//! request sent to the client app, `P` the verified result payload.
//!
//! ```text
//! INITIALIZED --(first fetch)--> CONNECTED
//! CONNECTED --(cancel)--> CANCELLED
//! CONNECTED/INITIALIZED --(proof processed)--> DONE
//! ```
//!
//! CANCELLED and DONE are terminal. The result is set exactly once and
//! setting it is what transitions the session to DONE.

use attesta_core::{SessionStatus, SessionToken, Timestamp};

use crate::error::{SessionError, SessionResult};

#[derive(Debug)]
pub struct Session<R, P> {
    token: SessionToken,
    status: SessionStatus,
    /// Original signed request text, retained verbatim so the client app
    /// can independently re-verify it.
    raw_request: String,
    /// Derived proof request, immutable after creation. Carries the fresh
    /// nonce and context.
    proof_request: R,
    result: Option<P>,
    /// Free-form service-provider data echoed back with the result.
    provider_data: Option<String>,
    created_at: Timestamp,
    timeout_secs: u64,
    /// Number of status long-polls currently suspended on this session.
    /// Decides whether cancellation removal is deferred to a poll.
    listeners: u32,
}

impl<R, P> Session<R, P> {
    pub fn new(
        raw_request: impl Into<String>,
        proof_request: R,
        provider_data: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            token: SessionToken::generate(),
            status: SessionStatus::Initialized,
            raw_request: raw_request.into(),
            proof_request,
            result: None,
            provider_data,
            created_at: Timestamp::now(),
            timeout_secs,
            listeners: 0,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn raw_request(&self) -> &str {
        &self.raw_request
    }

    pub fn proof_request(&self) -> &R {
        &self.proof_request
    }

    pub fn result(&self) -> Option<&P> {
        self.result.as_ref()
    }

    pub fn provider_data(&self) -> Option<&str> {
        self.provider_data.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// A session past its configured timeout is invalid for every operation,
    /// regardless of status.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.created_at.age_secs(now) > self.timeout_secs
    }

    /// First client fetch: INITIALIZED -> CONNECTED. Idempotent; fetching
    /// again never regresses a later status.
    pub fn connect(&mut self) {
        if self.status == SessionStatus::Initialized {
            self.status = SessionStatus::Connected;
        }
    }

    /// Verifier-initiated cancellation. Terminal states stay as they are.
    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = SessionStatus::Cancelled;
        }
    }

    /// Store the proof result. Exactly one result may ever be set; storing
    /// it transitions the session to DONE.
    pub fn set_result(&mut self, result: P) -> SessionResult<()> {
        if self.result.is_some() {
            return Err(SessionError::ResultAlreadySet);
        }
        self.result = Some(result);
        self.status = SessionStatus::Done;
        Ok(())
    }

    pub fn listener_attached(&self) -> bool {
        self.listeners > 0
    }

    pub fn attach_listener(&mut self) {
        self.listeners += 1;
    }

    pub fn detach_listener(&mut self) {
        self.listeners = self.listeners.saturating_sub(1);
    }
}

#[cfg(test)]
impl<R, P> Session<R, P> {
    pub(crate) fn set_token_for_test(&mut self, token: SessionToken) {
        self.token = token;
    }

    pub(crate) fn backdate_for_test(&mut self, secs: u64) {
        self.created_at =
            Timestamp::from_seconds(self.created_at.seconds_since_epoch.saturating_sub(secs));
    }
}

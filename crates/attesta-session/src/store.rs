//! In-memory session registry.
//!
//! The store maps token -> session handle. Each handle carries its own lock
//! plus a watch channel, so per-session mutation is serialized per token and
//! long-polls can be woken without touching the registry lock.
//!
//! Lock order: the registry lock may be held while taking a session lock
//! (expiry checks), never the other way around.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use attesta_core::{SessionStatus, SessionToken, Timestamp};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::session::Session;

// ---------------------------------------------------------------------------
// SessionHandle — one live session behind its own lock
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SessionHandle<R, P> {
    token: SessionToken,
    state: Mutex<Session<R, P>>,
    status_tx: watch::Sender<SessionStatus>,
}

impl<R, P> SessionHandle<R, P> {
    fn new(session: Session<R, P>) -> Self {
        let token = session.token().clone();
        let (status_tx, _) = watch::channel(session.status());
        Self {
            token,
            state: Mutex::new(session),
            status_tx,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Run `f` under the session lock. If `f` changed the status, waiting
    /// long-polls are woken after the lock is released.
    pub fn with<T>(&self, f: impl FnOnce(&mut Session<R, P>) -> T) -> T {
        let (out, status, changed) = {
            let mut session = self.state.lock().unwrap();
            let before = session.status();
            let out = f(&mut session);
            let after = session.status();
            (out, after, after != before)
        };
        if changed {
            self.status_tx.send_replace(status);
        }
        out
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().unwrap().status()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.state.lock().unwrap().is_expired(now)
    }

    /// Suspend until the next status transition or until `timeout` elapses,
    /// then return the current status. The session counts this caller as an
    /// attached listener for the duration of the wait so cancellation can
    /// defer removal to it. Returns immediately for terminal statuses.
    pub async fn wait_for_transition(&self, timeout: Duration) -> SessionStatus {
        let mut rx = self.status_tx.subscribe();
        {
            let mut session = self.state.lock().unwrap();
            if session.status().is_terminal() {
                return session.status();
            }
            session.attach_listener();
        }
        // Transitions published after subscribe() are never missed; the
        // suspension holds no lock.
        let _ = tokio::time::timeout(timeout, rx.changed()).await;
        let mut session = self.state.lock().unwrap();
        session.detach_listener();
        session.status()
    }
}

// ---------------------------------------------------------------------------
// SessionStore — token -> handle registry with bounded lifetime
// ---------------------------------------------------------------------------

pub struct SessionStore<R, P> {
    sessions: Mutex<HashMap<SessionToken, Arc<SessionHandle<R, P>>>>,
}

impl<R, P> SessionStore<R, P> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a freshly created session. The session is fully constructed
    /// before it becomes visible to any other caller.
    pub fn add(&self, session: Session<R, P>) -> SessionResult<Arc<SessionHandle<R, P>>> {
        let now = Timestamp::now();
        let handle = Arc::new(SessionHandle::new(session));
        let mut sessions = self.sessions.lock().unwrap();
        // Opportunistic sweep keeps the map bounded between timer ticks.
        sessions.retain(|_, h| !h.is_expired(now));
        if sessions.contains_key(handle.token()) {
            return Err(SessionError::TokenCollision);
        }
        sessions.insert(handle.token().clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Look up a live session. Expired sessions are removed on sight and
    /// reported as not found, exactly like unknown tokens.
    pub fn get(&self, token: &SessionToken) -> SessionResult<Arc<SessionHandle<R, P>>> {
        let now = Timestamp::now();
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(token) {
            None => Err(SessionError::NotFound),
            Some(handle) if handle.is_expired(now) => {
                sessions.remove(token);
                Err(SessionError::NotFound)
            }
            Some(handle) => Ok(Arc::clone(handle)),
        }
    }

    /// Idempotent removal.
    pub fn remove(&self, token: &SessionToken) {
        self.sessions.lock().unwrap().remove(token);
    }

    /// Remove every session past its timeout, regardless of status.
    /// Returns the number of sessions removed.
    pub fn sweep(&self) -> usize {
        let now = Timestamp::now();
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, h| !h.is_expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "swept expired sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R, P> Default for SessionStore<R, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(timeout_secs: u64) -> Session<String, String> {
        Session::new("raw", "request".to_string(), None, timeout_secs)
    }

    #[test]
    fn test_add_and_get() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();
        let token = handle.token().clone();

        let found = store.get(&token).unwrap();
        assert_eq!(found.token(), &token);
        assert_eq!(found.status(), SessionStatus::Initialized);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_unknown_token() {
        let store: SessionStore<String, String> = SessionStore::new();
        let err = store.get(&SessionToken::new("nope")).unwrap_err();
        assert_eq!(err, SessionError::NotFound);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();
        let token = handle.token().clone();

        store.remove(&token);
        store.remove(&token);
        assert!(store.get(&token).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_token_collision_rejected() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();

        let mut dup = session(60);
        dup.set_token_for_test(handle.token().clone());
        assert_eq!(store.add(dup).unwrap_err(), SessionError::TokenCollision);
    }

    #[test]
    fn test_expired_session_not_found_and_removed() {
        let store: SessionStore<String, String> = SessionStore::new();
        let mut s = session(60);
        s.backdate_for_test(61);
        let handle = store.add(s).unwrap();
        let token = handle.token().clone();

        assert_eq!(store.get(&token).unwrap_err(), SessionError::NotFound);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store: SessionStore<String, String> = SessionStore::new();
        let mut old = session(60);
        old.backdate_for_test(120);
        store.add(old).unwrap();
        let fresh = store.add(session(60)).unwrap();

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(fresh.token()).is_ok());
    }

    #[test]
    fn test_sweep_removes_expired_regardless_of_status() {
        let store: SessionStore<String, String> = SessionStore::new();
        let mut s = session(60);
        s.backdate_for_test(120);
        let handle = store.add(s).unwrap();
        handle.with(|s| {
            s.connect();
            s.set_result("done".into()).unwrap();
        });
        assert_eq!(store.sweep(), 1);
    }

    #[test]
    fn test_with_serializes_result_writes() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();

        let first = handle.with(|s| s.set_result("one".into()));
        let second = handle.with(|s| s.set_result("two".into()));
        assert!(first.is_ok());
        assert_eq!(second, Err(SessionError::ResultAlreadySet));
        assert_eq!(handle.with(|s| s.result().cloned()), Some("one".to_string()));
    }

    #[test]
    fn test_concurrent_result_writes_apply_exactly_once() {
        let store: Arc<SessionStore<String, String>> = Arc::new(SessionStore::new());
        let handle = store.add(session(60)).unwrap();
        let token = handle.token().clone();

        let mut threads = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let token = token.clone();
            threads.push(std::thread::spawn(move || {
                let handle = store.get(&token).unwrap();
                handle.with(|s| s.set_result(format!("writer-{}", i)).is_ok())
            }));
        }
        let wins: usize = threads
            .into_iter()
            .map(|t| t.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(handle.status(), SessionStatus::Done);
    }

    #[tokio::test]
    async fn test_wait_for_transition_wakes_on_cancel() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();
        handle.with(|s| s.connect());

        let waiter = Arc::clone(&handle);
        let poll = tokio::spawn(async move {
            waiter.wait_for_transition(Duration::from_secs(5)).await
        });

        // Give the poll a moment to attach.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.with(|s| {
            s.cancel();
            s.listener_attached()
        }));

        let observed = poll.await.unwrap();
        assert_eq!(observed, SessionStatus::Cancelled);
        // The waiter has detached by the time it returns.
        assert!(!handle.with(|s| s.listener_attached()));
    }

    #[tokio::test]
    async fn test_wait_for_transition_times_out() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();
        handle.with(|s| s.connect());

        let status = handle.wait_for_transition(Duration::from_millis(20)).await;
        assert_eq!(status, SessionStatus::Connected);
        assert!(!handle.with(|s| s.listener_attached()));
    }

    #[tokio::test]
    async fn test_overlapping_waits_keep_listener_attached() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();
        handle.with(|s| s.connect());

        let short_waiter = Arc::clone(&handle);
        let short = tokio::spawn(async move {
            short_waiter
                .wait_for_transition(Duration::from_millis(50))
                .await
        });
        let long_waiter = Arc::clone(&handle);
        let long = tokio::spawn(async move {
            long_waiter.wait_for_transition(Duration::from_secs(5)).await
        });

        // Let the short poll time out while the long one stays suspended.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(short.await.unwrap(), SessionStatus::Connected);
        assert!(handle.with(|s| s.listener_attached()));

        handle.with(|s| s.cancel());
        assert_eq!(long.await.unwrap(), SessionStatus::Cancelled);
        assert!(!handle.with(|s| s.listener_attached()));
    }

    #[tokio::test]
    async fn test_wait_for_transition_terminal_returns_immediately() {
        let store: SessionStore<String, String> = SessionStore::new();
        let handle = store.add(session(60)).unwrap();
        handle.with(|s| {
            s.connect();
            s.cancel();
        });

        let status = handle.wait_for_transition(Duration::from_secs(5)).await;
        assert_eq!(status, SessionStatus::Cancelled);
    }
}

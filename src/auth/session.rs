//! Signed-in session state and its change notifications.
//!
//! The identity client is the only writer ([`SessionStore`]). Everything else
//! receives a [`SessionHandle`], a read-only view that observes every sign-in,
//! token refresh and sign-out.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A signed-in user as seen by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the ID token expires within `leeway` of `now`.
    pub fn is_expiring(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        self.expires_at - leeway <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No notification has been delivered yet.
    #[default]
    Unknown,
    SignedOut,
    SignedIn(Session),
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::SignedIn(session) => Some(session),
            _ => None,
        }
    }
}

/// Write side of the session stream.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<AuthState>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::Unknown);
        Self { tx }
    }

    pub fn set(&self, state: AuthState) {
        self.tx.send_replace(state);
    }

    pub fn state(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only, clonable view on the current session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<AuthState>,
}

impl SessionHandle {
    /// A handle frozen on `state`, for hosts and tests that manage sessions themselves.
    pub fn fixed(state: AuthState) -> Self {
        let (_, rx) = watch::channel(state);
        Self { rx }
    }

    pub fn state(&self) -> AuthState {
        self.rx.borrow().clone()
    }

    pub fn current(&self) -> Option<Session> {
        self.rx.borrow().session().cloned()
    }

    /// Waits for the next session event.
    ///
    /// Returns `None` once the identity client is gone and no event can follow.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Marks the current state as seen, so `changed` only reports newer events.
    pub fn mark_seen(&mut self) -> AuthState {
        self.rx.borrow_and_update().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(uid: &str, email: Option<&str>) -> Session {
        Session {
            uid: uid.to_string(),
            email: email.map(str::to_string),
            display_name: None,
            photo_url: None,
            id_token: "id-token".to_string(),
            refresh_token: "refresh-token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_handle_observes_transitions() {
        let store = SessionStore::new();
        let mut handle = store.handle();
        assert_eq!(handle.state(), AuthState::Unknown);

        store.set(AuthState::SignedIn(session("alice", Some("alice@example.com"))));
        let state = handle.changed().await.unwrap();
        assert_eq!(state.session().unwrap().uid, "alice");
        assert_eq!(handle.current().unwrap().uid, "alice");

        store.set(AuthState::SignedOut);
        assert_eq!(handle.changed().await, Some(AuthState::SignedOut));
        assert!(handle.current().is_none());
    }

    #[tokio::test]
    async fn test_changed_ends_when_store_dropped() {
        let store = SessionStore::new();
        let mut handle = store.handle();
        drop(store);
        assert_eq!(handle.changed().await, None);
    }

    #[test]
    fn test_is_expiring() {
        let mut s = session("bob", None);
        let now = Utc::now();
        s.expires_at = now + Duration::seconds(30);
        assert!(s.is_expiring(now, Duration::seconds(60)));
        assert!(!s.is_expiring(now, Duration::seconds(10)));
    }
}

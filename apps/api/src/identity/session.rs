//! Per-user session state with an explicit subscribe contract.
//!
//! Each user has one `watch` channel. `apply` replaces the state synchronously
//! so a read after an event never sees the pre-event value; dropping a
//! receiver is the unsubscribe.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::identity::oauth::PROVIDER;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub provider: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub provider_token: Option<String>,
    pub identities: Vec<LinkedIdentity>,
}

#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut { user_id: Uuid },
}

/// What callers observe. The default value is the signed-out baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing)]
    pub provider_token: Option<String>,
    pub identities: Vec<LinkedIdentity>,
    pub mailbox_connected: bool,
}

impl SessionState {
    fn from_session(session: &Session) -> Self {
        Self {
            user_id: Some(session.user_id),
            provider_token: session.provider_token.clone(),
            identities: session.identities.clone(),
            mailbox_connected: session.identities.iter().any(|i| i.provider == PROVIDER),
        }
    }

    fn to_session(&self) -> Option<Session> {
        self.user_id.map(|user_id| Session {
            user_id,
            provider_token: self.provider_token.clone(),
            identities: self.identities.clone(),
        })
    }
}

#[derive(Default)]
pub struct SessionHub {
    channels: Mutex<HashMap<Uuid, watch::Sender<SessionState>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: AuthEvent) {
        let (user_id, next) = match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                (session.user_id, SessionState::from_session(&session))
            }
            AuthEvent::SignedOut { user_id } => (user_id, SessionState::default()),
        };

        match self.channels.lock().entry(user_id) {
            Entry::Occupied(slot) => {
                slot.get().send_replace(next);
            }
            Entry::Vacant(slot) => {
                slot.insert(watch::channel(next).0);
            }
        }
    }

    pub fn current(&self, user_id: Uuid) -> SessionState {
        self.channels
            .lock()
            .get(&user_id)
            .map(|tx| tx.borrow().clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, user_id: Uuid) -> watch::Receiver<SessionState> {
        self.channels
            .lock()
            .entry(user_id)
            .or_insert_with(|| watch::channel(SessionState::default()).0)
            .subscribe()
    }

    /// Attaches a fresh provider token to a signed-in session and marks the
    /// mailbox identity as linked. No-op for users without a session.
    pub fn record_provider_token(&self, user_id: Uuid, token: String) {
        let Some(mut session) = self.current(user_id).to_session() else {
            return;
        };
        session.provider_token = Some(token);
        if !session.identities.iter().any(|i| i.provider == PROVIDER) {
            session.identities.push(LinkedIdentity {
                provider: PROVIDER.to_string(),
                email: None,
            });
        }
        self.apply(AuthEvent::TokenRefreshed(session));
    }

    /// Drops the provider token and identity from a signed-in session.
    pub fn unlink_provider(&self, user_id: Uuid) {
        let Some(mut session) = self.current(user_id).to_session() else {
            return;
        };
        session.provider_token = None;
        session.identities.retain(|i| i.provider != PROVIDER);
        self.apply(AuthEvent::TokenRefreshed(session));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: Uuid, providers: &[&str], token: Option<&str>) -> Session {
        Session {
            user_id,
            provider_token: token.map(String::from),
            identities: providers
                .iter()
                .map(|p| LinkedIdentity {
                    provider: p.to_string(),
                    email: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_sign_in_derives_mailbox_flag() {
        let hub = SessionHub::new();
        let user = Uuid::new_v4();

        hub.apply(AuthEvent::SignedIn(session(user, &["email", "azure"], Some("tok"))));
        let state = hub.current(user);
        assert_eq!(state.user_id, Some(user));
        assert_eq!(state.provider_token.as_deref(), Some("tok"));
        assert!(state.mailbox_connected);

        hub.apply(AuthEvent::SignedIn(session(user, &["email"], None)));
        assert!(!hub.current(user).mailbox_connected);
    }

    #[test]
    fn test_sign_out_resets_to_baseline() {
        let hub = SessionHub::new();
        let user = Uuid::new_v4();
        hub.apply(AuthEvent::SignedIn(session(user, &["azure"], Some("tok"))));

        hub.apply(AuthEvent::SignedOut { user_id: user });

        assert_eq!(hub.current(user), SessionState::default());
    }

    #[test]
    fn test_subscriber_sees_token_refresh_immediately() {
        let hub = SessionHub::new();
        let user = Uuid::new_v4();
        let mut rx = hub.subscribe(user);
        hub.apply(AuthEvent::SignedIn(session(user, &["azure"], Some("old"))));

        hub.apply(AuthEvent::TokenRefreshed(session(user, &["azure"], Some("new"))));

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().provider_token.as_deref(), Some("new"));
    }

    #[test]
    fn test_record_provider_token_requires_session() {
        let hub = SessionHub::new();
        let user = Uuid::new_v4();
        hub.record_provider_token(user, "tok".into());
        assert_eq!(hub.current(user), SessionState::default());

        hub.apply(AuthEvent::SignedIn(session(user, &["email"], None)));
        hub.record_provider_token(user, "tok".into());
        let state = hub.current(user);
        assert!(state.mailbox_connected);
        assert_eq!(state.provider_token.as_deref(), Some("tok"));

        hub.unlink_provider(user);
        let state = hub.current(user);
        assert!(!state.mailbox_connected);
        assert!(state.provider_token.is_none());
    }

    #[test]
    fn test_users_are_isolated() {
        let hub = SessionHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        hub.apply(AuthEvent::SignedIn(session(a, &["azure"], Some("a"))));
        assert_eq!(hub.current(b), SessionState::default());
    }
}

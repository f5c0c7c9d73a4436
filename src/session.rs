//! Per-chat-user session state and the store that holds it.
//!
//! A session is keyed by the chat platform's user id and lives for the
//! process lifetime. It tracks authentication (bearer token from the
//! wallet backend), a cached contact list, and at most one pending
//! multi-turn operation awaiting a secret key.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::agent::intent::Intent;
use crate::backend::Contact;

/// State for one chat user.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub authenticated: bool,
    /// Present iff `authenticated` is true.
    pub session_token: Option<SecretString>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    /// At most one multi-turn operation may be outstanding.
    pub pending: Option<PendingOperation>,
    /// Contact list cached from the backend; refreshed on login and on
    /// every list-contacts call.
    pub contacts: Option<Vec<Contact>>,
}

impl Session {
    /// Record a successful login. Replaces any previous identity.
    pub fn establish(&mut self, token: SecretString, user_id: Option<String>, email: String) {
        self.authenticated = true;
        self.session_token = Some(token);
        self.user_id = user_id;
        self.email = Some(email);
    }

    /// Drop authentication and everything derived from it. The session
    /// entry itself stays; only its fields reset.
    pub fn clear_auth(&mut self) {
        *self = Session::default();
    }
}

/// A partially-specified operation awaiting one more turn of input.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub action: PendingAction,
    pub created_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(action: PendingAction) -> Self {
        Self {
            action,
            created_at: Utc::now(),
        }
    }

    pub fn expired(&self, ttl: std::time::Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.created_at);
        age >= chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
    }
}

/// The resolved parameters captured when the operation was requested.
/// Immutable until the awaited secret arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    Payment {
        destination: String,
        amount: String,
        asset_code: String,
        memo: String,
    },
    PathPayment {
        destination: String,
        dest_asset: String,
        dest_amount: String,
        source_asset: String,
    },
}

impl PendingAction {
    pub fn intent(&self) -> Intent {
        match self {
            Self::Payment { .. } => Intent::ExecutePayment,
            Self::PathPayment { .. } => Intent::ExecutePathPayment,
        }
    }
}

/// Process-wide session state.
///
/// `get` never fails: an unknown id yields a default unauthenticated
/// session. Updates are whole-session replacement, last write wins;
/// the chat transport delivers one message per session at a time, so no
/// stronger guarantee is needed (documented assumption, not a lock).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Session;
    async fn put(&self, session_id: &str, session: Session);
    /// Reset to a default unauthenticated session (logout, cancellation).
    async fn clear(&self, session_id: &str);
}

/// In-memory store backing all channels of one process.
#[derive(Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Session {
        self.inner
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn put(&self, session_id: &str, session: Session) {
        self.inner
            .write()
            .await
            .insert(session_id.to_string(), session);
    }

    async fn clear(&self, session_id: &str) {
        self.inner
            .write()
            .await
            .insert(session_id.to_string(), Session::default());
    }
}

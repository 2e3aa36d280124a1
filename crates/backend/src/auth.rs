//! Auth provider trait and in-memory implementation.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;
use futures_core::Stream;
use futures_util::stream;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{BackendError, Result};

/// An authenticated session as reported by the auth provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    /// Provider-side user metadata; carries the role claim.
    pub metadata: Map<String, Value>,
}

impl Session {
    /// Returns the role claim from the session metadata, if any.
    pub fn role_claim(&self) -> Option<&str> {
        self.metadata.get("role").and_then(Value::as_str)
    }
}

/// A stream of session changes: the new session, or none on sign-out.
///
/// Delivered asynchronously, at least once per actual change.
pub type SessionStream = Pin<Box<dyn Stream<Item = Option<Session>> + Send>>;

/// Trait for the external auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the current session, if one exists.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Exchanges credentials for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Registers a new user and returns their session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<Session>;

    /// Ends the current session.
    async fn sign_out(&self) -> Result<()>;

    /// Subscribes to session changes.
    fn on_auth_state_change(&self) -> SessionStream;
}

#[derive(Default)]
struct InMemoryAuthState {
    users: HashMap<String, (String, UserId, Map<String, Value>)>,
    current: Option<Session>,
    watchers: Vec<mpsc::UnboundedSender<Option<Session>>>,
    fail_on_sign_in: bool,
}

/// In-memory auth provider for testing.
#[derive(Clone, Default)]
pub struct InMemoryAuthProvider {
    state: Arc<RwLock<InMemoryAuthState>>,
}

impl InMemoryAuthProvider {
    /// Creates a new in-memory auth provider with no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user without signing them in. Returns their ID.
    pub fn register_user(&self, email: &str, password: &str, role: &str) -> UserId {
        let user_id = UserId::new();
        let mut metadata = Map::new();
        metadata.insert("role".to_string(), Value::String(role.to_string()));
        self.state.write().unwrap().users.insert(
            email.to_string(),
            (password.to_string(), user_id, metadata),
        );
        user_id
    }

    /// Configures the provider to reject the next sign-in attempts.
    pub fn set_fail_on_sign_in(&self, fail: bool) {
        self.state.write().unwrap().fail_on_sign_in = fail;
    }

    fn emit(&self, change: Option<Session>) {
        let mut state = self.state.write().unwrap();
        state.watchers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.state.read().unwrap().current.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let session = {
            let mut state = self.state.write().unwrap();
            if state.fail_on_sign_in {
                return Err(BackendError::Auth("service unavailable".to_string()));
            }
            let (stored_password, user_id, metadata) = state
                .users
                .get(email)
                .cloned()
                .ok_or(BackendError::InvalidCredentials)?;
            if stored_password != password {
                return Err(BackendError::InvalidCredentials);
            }
            let session = Session {
                user_id,
                email: email.to_string(),
                metadata,
            };
            state.current = Some(session.clone());
            session
        };
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, Value>,
    ) -> Result<Session> {
        let session = {
            let mut state = self.state.write().unwrap();
            if state.users.contains_key(email) {
                return Err(BackendError::Auth("User already registered".to_string()));
            }
            let user_id = UserId::new();
            state.users.insert(
                email.to_string(),
                (password.to_string(), user_id, metadata.clone()),
            );
            let session = Session {
                user_id,
                email: email.to_string(),
                metadata,
            };
            state.current = Some(session.clone());
            session
        };
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.state.write().unwrap().current = None;
        self.emit(None);
        Ok(())
    }

    fn on_auth_state_change(&self) -> SessionStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.write().unwrap().watchers.push(tx);
        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|change| (change, rx))
        }))
    }
}

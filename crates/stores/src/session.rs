//! The session store: the current authenticated identity and its role
//! claim, kept in sync with the auth provider's change stream.

use std::sync::Arc;

use backend::{
    AuthProvider, Filter, ObjectStore, RecordStore, SelectQuery, Session, decode_row,
};
use common::UserId;
use domain::{Profile, Role, UserProfile, tables};
use futures_util::StreamExt;
use serde_json::{Map, Value, json};
use tokio::sync::{RwLock, watch};

use crate::error::StoreError;
use crate::notify::Notifier;
use crate::signal::ChangeSignal;

/// State container for the authenticated user.
pub struct SessionStore<A, R, O>
where
    A: AuthProvider,
    R: RecordStore,
    O: ObjectStore,
{
    auth: A,
    records: R,
    objects: O,
    notifier: Arc<dyn Notifier>,
    state: Arc<RwLock<Option<UserProfile>>>,
    signal: ChangeSignal,
}

/// Builds the session-store view of a user: session identity plus the
/// profile row's display fields. A missing or unreadable profile row
/// degrades to the bare identity rather than failing.
async fn build_profile<R: RecordStore>(records: &R, session: &Session) -> UserProfile {
    let mut profile = UserProfile {
        id: session.user_id,
        email: session.email.clone(),
        full_name: None,
        avatar_url: None,
        role: Role::from_claim(session.role_claim()),
    };

    let query =
        SelectQuery::new().filter(Filter::eq("id", session.user_id.to_string()));
    match records.select(tables::PROFILES, query).await {
        Ok(rows) => {
            if let Some(row) = rows.into_iter().next() {
                match decode_row::<Profile>(row) {
                    Ok(stored) => {
                        profile.full_name = stored.full_name;
                        profile.avatar_url = stored.avatar_url;
                    }
                    Err(e) => tracing::warn!(error = %e, "malformed profile row"),
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, user_id = %session.user_id, "profile load failed"),
    }

    profile
}

impl<A, R, O> SessionStore<A, R, O>
where
    A: AuthProvider,
    R: RecordStore + Clone + 'static,
    O: ObjectStore,
{
    /// Creates a session store with no user.
    pub fn new(auth: A, records: R, objects: O, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            auth,
            records,
            objects,
            notifier,
            state: Arc::new(RwLock::new(None)),
            signal: ChangeSignal::new(),
        }
    }

    /// Reads the provider's current session and starts following its
    /// change stream on a background task.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), StoreError> {
        if let Some(session) = self.auth.get_session().await? {
            let profile = build_profile(&self.records, &session).await;
            *self.state.write().await = Some(profile);
            self.signal.notify();
        }

        let mut changes = self.auth.on_auth_state_change();
        let records = self.records.clone();
        let state = Arc::clone(&self.state);
        let signal = self.signal.clone();
        tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let profile = match change {
                    Some(session) => Some(build_profile(&records, &session).await),
                    None => None,
                };
                *state.write().await = profile;
                signal.notify();
            }
        });

        Ok(())
    }

    /// Subscribes to session changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.signal.subscribe()
    }

    /// Signs in with email and password.
    ///
    /// Failures are notified *and* returned so the caller can decide
    /// not to navigate.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), StoreError> {
        match self.auth.sign_in_with_password(email, password).await {
            Ok(session) => {
                let profile = build_profile(&self.records, &session).await;
                *self.state.write().await = Some(profile);
                self.signal.notify();
                self.notifier.success("Welcome back!");
                Ok(())
            }
            Err(e) => {
                self.notifier.error(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Registers a new account with the default `user` role claim and
    /// creates its profile row.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<(), StoreError> {
        let mut metadata = Map::new();
        metadata.insert("full_name".to_string(), Value::String(full_name.to_string()));
        metadata.insert("role".to_string(), Value::String(Role::User.as_str().to_string()));

        let session = match self.auth.sign_up(email, password, metadata).await {
            Ok(session) => session,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return Err(e.into());
            }
        };

        let profile_row = json!({
            "id": session.user_id.to_string(),
            "full_name": full_name,
        });
        if let Err(e) = self.records.insert(tables::PROFILES, vec![profile_row]).await {
            self.notifier.error(&e.to_string());
            return Err(e.into());
        }

        *self.state.write().await = Some(UserProfile {
            id: session.user_id,
            email: session.email,
            full_name: Some(full_name.to_string()),
            avatar_url: None,
            role: Role::User,
        });
        self.signal.notify();
        self.notifier.success("Account created successfully!");
        Ok(())
    }

    /// Ends the current session.
    #[tracing::instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), StoreError> {
        match self.auth.sign_out().await {
            Ok(()) => {
                *self.state.write().await = None;
                self.signal.notify();
                self.notifier.success("Signed out successfully");
                Ok(())
            }
            Err(e) => {
                self.notifier.error(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Returns a snapshot of the current user.
    pub async fn current_user(&self) -> Option<UserProfile> {
        self.state.read().await.clone()
    }

    /// Returns the current user's ID, if signed in.
    pub async fn user_id(&self) -> Option<UserId> {
        self.state.read().await.as_ref().map(|u| u.id)
    }

    /// Returns true if the current user carries the admin role claim.
    pub async fn is_admin(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .map(|u| u.role.is_admin())
            .unwrap_or(false)
    }

    /// Updates the current user's display name.
    #[tracing::instrument(skip(self))]
    pub async fn update_profile(&self, full_name: &str) {
        let Some(user_id) = self.user_id().await else {
            return;
        };

        let filters = vec![Filter::eq("id", user_id.to_string())];
        match self
            .records
            .update(tables::PROFILES, json!({ "full_name": full_name }), filters)
            .await
        {
            Ok(_) => {
                if let Some(user) = self.state.write().await.as_mut() {
                    user.full_name = Some(full_name.to_string());
                }
                self.signal.notify();
                self.notifier.success("Profile updated successfully!");
            }
            Err(_) => self.notifier.error("Error updating profile"),
        }
    }

    /// Uploads a new avatar and records its public URL on the profile.
    #[tracing::instrument(skip(self, bytes))]
    pub async fn upload_avatar(&self, file_name: &str, bytes: Vec<u8>) {
        let Some(user_id) = self.user_id().await else {
            return;
        };

        let extension = file_name.rsplit('.').next().unwrap_or("png");
        let path = format!("avatars/{}-{}.{}", user_id, uuid::Uuid::new_v4(), extension);

        if let Err(e) = self.objects.upload(&path, bytes).await {
            tracing::warn!(error = %e, "avatar upload failed");
            self.notifier.error("Error uploading avatar");
            return;
        }
        let url = self.objects.public_url(&path);

        let filters = vec![Filter::eq("id", user_id.to_string())];
        match self
            .records
            .update(tables::PROFILES, json!({ "avatar_url": url.clone() }), filters)
            .await
        {
            Ok(_) => {
                if let Some(user) = self.state.write().await.as_mut() {
                    user.avatar_url = Some(url);
                }
                self.signal.notify();
                self.notifier.success("Avatar updated!");
            }
            Err(_) => self.notifier.error("Error uploading avatar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use backend::{InMemoryAuthProvider, InMemoryObjectStore, InMemoryRecordStore};

    type TestSessionStore =
        SessionStore<InMemoryAuthProvider, InMemoryRecordStore, InMemoryObjectStore>;

    fn setup() -> (TestSessionStore, InMemoryAuthProvider, InMemoryRecordStore, RecordingNotifier)
    {
        let auth = InMemoryAuthProvider::new();
        let records = InMemoryRecordStore::new();
        let objects = InMemoryObjectStore::default();
        let notifier = RecordingNotifier::new();
        let store = SessionStore::new(
            auth.clone(),
            records.clone(),
            objects,
            Arc::new(notifier.clone()),
        );
        (store, auth, records, notifier)
    }

    #[tokio::test]
    async fn test_sign_in_loads_profile_row() {
        let (store, auth, records, notifier) = setup();
        let user_id = auth.register_user("a@example.com", "pw", "user");
        records
            .seed(
                tables::PROFILES,
                vec![json!({ "id": user_id.to_string(), "full_name": "Asha" })],
            )
            .await;

        store.sign_in("a@example.com", "pw").await.unwrap();

        let user = store.current_user().await.unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.full_name.as_deref(), Some("Asha"));
        assert_eq!(user.role, Role::User);
        assert!(notifier.has_success("Welcome back!"));
    }

    #[tokio::test]
    async fn test_sign_in_failure_is_notified_and_returned() {
        let (store, auth, _, notifier) = setup();
        auth.register_user("a@example.com", "pw", "user");

        let result = store.sign_in("a@example.com", "wrong").await;

        assert!(result.is_err());
        assert!(store.current_user().await.is_none());
        assert!(!notifier.notices().is_empty());
    }

    #[tokio::test]
    async fn test_sign_up_creates_profile_row() {
        let (store, _, records, notifier) = setup();

        store.sign_up("new@example.com", "pw", "Nia").await.unwrap();

        assert_eq!(records.row_count(tables::PROFILES).await, 1);
        let user = store.current_user().await.unwrap();
        assert_eq!(user.full_name.as_deref(), Some("Nia"));
        assert!(!user.role.is_admin());
        assert!(notifier.has_success("Account created successfully!"));
    }

    #[tokio::test]
    async fn test_admin_role_claim() {
        let (store, auth, _, _) = setup();
        auth.register_user("root@example.com", "pw", "admin");

        store.sign_in("root@example.com", "pw").await.unwrap();

        assert!(store.is_admin().await);
    }

    #[tokio::test]
    async fn test_sign_out_clears_state() {
        let (store, auth, _, _) = setup();
        auth.register_user("a@example.com", "pw", "user");
        store.sign_in("a@example.com", "pw").await.unwrap();

        store.sign_out().await.unwrap();

        assert!(store.current_user().await.is_none());
        assert!(store.user_id().await.is_none());
        assert!(!store.is_admin().await);
    }

    #[tokio::test]
    async fn test_initialize_follows_auth_changes() {
        let (store, auth, _, _) = setup();
        auth.register_user("a@example.com", "pw", "user");
        store.initialize().await.unwrap();
        assert!(store.current_user().await.is_none());

        let mut changes = store.subscribe();
        auth.sign_in_with_password("a@example.com", "pw").await.unwrap();
        changes.changed().await.unwrap();
        assert!(store.current_user().await.is_some());

        auth.sign_out().await.unwrap();
        changes.changed().await.unwrap();
        assert!(store.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (store, auth, records, _) = setup();
        let user_id = auth.register_user("a@example.com", "pw", "user");
        records
            .seed(tables::PROFILES, vec![json!({ "id": user_id.to_string() })])
            .await;
        store.sign_in("a@example.com", "pw").await.unwrap();

        store.update_profile("New Name").await;

        let user = store.current_user().await.unwrap();
        assert_eq!(user.full_name.as_deref(), Some("New Name"));
        let rows = records.rows(tables::PROFILES).await;
        assert_eq!(rows[0]["full_name"], json!("New Name"));
    }

    #[tokio::test]
    async fn test_upload_avatar_stores_public_url() {
        let (store, auth, records, notifier) = setup();
        let user_id = auth.register_user("a@example.com", "pw", "user");
        records
            .seed(tables::PROFILES, vec![json!({ "id": user_id.to_string() })])
            .await;
        store.sign_in("a@example.com", "pw").await.unwrap();

        store.upload_avatar("me.png", vec![1, 2, 3]).await;

        let user = store.current_user().await.unwrap();
        let url = user.avatar_url.unwrap();
        assert!(url.starts_with("https://storage.test/avatars/"));
        assert!(url.ends_with(".png"));
        assert!(notifier.has_success("Avatar updated!"));
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;

const NIL_USER_ID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl User {
    /// True for an empty id or the nil GUID, which the server uses for
    /// "no user".
    pub fn has_default_id(&self) -> bool {
        let id = self.id.trim();
        id.is_empty() || id == NIL_USER_ID
    }
}

/// A complete credential set. Always replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: User, access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            user: Some(user),
            access_token: access_token.into(),
            refresh_token,
            issued_at: Utc::now(),
        }
    }

    /// A session counts as logged in only when the user is present with a
    /// real id and there is an access token to present.
    pub fn is_logged_in(&self) -> bool {
        let has_user = self.user.as_ref().is_some_and(|u| !u.has_default_id());
        has_user && !self.access_token.trim().is_empty()
    }

    pub fn access_token(&self) -> Option<&str> {
        Some(self.access_token.as_str()).filter(|t| !t.trim().is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Shared, in-memory owner of the current [`Session`].
///
/// Readers get `Arc` snapshots, so they never observe a half-written
/// session. Writes go through [`replace`](Self::replace) and
/// [`clear`](Self::clear), which swap the whole record and then mirror it
/// to the credential store.
pub struct SessionState {
    current: watch::Sender<Option<Arc<Session>>>,
    store: Arc<dyn CredentialStore>,
    // Held across swap + persist so the store never lags behind memory.
    write_lock: Mutex<()>,
}

impl SessionState {
    /// Create a logged-out state backed by `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Create the state and adopt a persisted session if it is still a
    /// logged-in session. Anything else found in the store is discarded.
    pub async fn initialize(store: Arc<dyn CredentialStore>) -> Self {
        let state = Self::new(store);

        match state.store.load().await {
            Ok(Some(session)) if session.is_logged_in() => {
                debug!(user_id = ?session.user_id(), "Restored persisted session");
                state.current.send_replace(Some(Arc::new(session)));
            }
            Ok(Some(_)) => {
                warn!("Persisted session is not logged in, discarding");
                state.discard_persisted().await;
            }
            Ok(None) => debug!("No persisted session found"),
            Err(e) if e.is_malformed() => {
                warn!(error = %e, "Persisted session is malformed, discarding");
                state.discard_persisted().await;
            }
            Err(e) => warn!(error = %e, "Failed to load persisted session"),
        }

        state
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current.borrow().as_ref().is_some_and(|s| s.is_logged_in())
    }

    pub fn access_token(&self) -> Option<String> {
        self.current
            .borrow()
            .as_ref()
            .and_then(|s| s.access_token().map(str::to_owned))
    }

    /// Watch login/logout transitions.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Session>>> {
        self.current.subscribe()
    }

    /// Install `session` as the current session and persist it.
    pub(crate) async fn replace(&self, session: Session) -> Arc<Session> {
        let _write = self.write_lock.lock().await;
        let session = Arc::new(session);
        self.current.send_replace(Some(Arc::clone(&session)));

        if let Err(e) = self.store.save(&session).await {
            warn!(error = %e, "Failed to persist session");
        }
        session
    }

    /// Install `session` only if `expected` is still the current session.
    ///
    /// Returns `None`, touching nothing, when a logout or a newer login
    /// happened since `expected` was read.
    pub(crate) async fn replace_if_current(
        &self,
        expected: &Arc<Session>,
        session: Session,
    ) -> Option<Arc<Session>> {
        let _write = self.write_lock.lock().await;
        let unchanged = self
            .current
            .borrow()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, expected));
        if !unchanged {
            return None;
        }

        let session = Arc::new(session);
        self.current.send_replace(Some(Arc::clone(&session)));
        if let Err(e) = self.store.save(&session).await {
            warn!(error = %e, "Failed to persist session");
        }
        Some(session)
    }

    /// Drop the current session and its persisted copy. Returns whether a
    /// session was present. Safe to call repeatedly.
    pub(crate) async fn clear(&self) -> bool {
        let _write = self.write_lock.lock().await;
        let previous = self.current.send_replace(None);

        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to remove persisted session");
        }
        if previous.is_some() {
            info!("Session cleared");
        }
        previous.is_some()
    }

    async fn discard_persisted(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to remove invalid persisted session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStore, StoreError};
    use crate::test_support::{session_for, user};

    #[test]
    fn test_is_logged_in_requires_all_fields() {
        assert!(session_for("u1", "T1", Some("R1")).is_logged_in());
        assert!(session_for("u1", "T1", None).is_logged_in());

        // Missing pieces
        assert!(!session_for("u1", "", Some("R1")).is_logged_in());
        assert!(!session_for("u1", "   ", Some("R1")).is_logged_in());
        assert!(!session_for("", "T1", Some("R1")).is_logged_in());

        let mut no_user = session_for("u1", "T1", Some("R1"));
        no_user.user = None;
        assert!(!no_user.is_logged_in());
    }

    #[test]
    fn test_nil_guid_is_default_id() {
        assert!(user("00000000-0000-0000-0000-000000000000").has_default_id());
        assert!(user("").has_default_id());
        assert!(!user("22b210e3-d325-41be-b761-31e18bfe2c73").has_default_id());
        assert!(!user("u1").has_default_id());
    }

    #[test]
    fn test_zero_like_ids_are_real_users() {
        assert!(!user("0").has_default_id());
        assert!(!user("-").has_default_id());
        assert!(!user("0000").has_default_id());
        assert!(session_for("0", "T1", Some("R1")).is_logged_in());
    }

    #[test]
    fn test_empty_refresh_token_counts_as_missing() {
        assert_eq!(session_for("u1", "T1", Some("")).refresh_token(), None);
        assert_eq!(session_for("u1", "T1", Some("R1")).refresh_token(), Some("R1"));
    }

    #[test]
    fn test_session_json_round_trip() {
        let mut session = session_for("u1", "T1", Some("R1"));
        if let Some(u) = session.user.as_mut() {
            u.photo_url = Some("https://cdn.example.com/u1.png".to_string());
        }

        let json = serde_json::to_string(&session).expect("serialize");
        assert!(json.contains("\"accessToken\":\"T1\""));
        assert!(json.contains("\"photoUrl\""));

        let back: Session = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, session);
    }

    #[tokio::test]
    async fn test_replace_logs_in_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let state = SessionState::new(store.clone());
        assert!(!state.is_logged_in());

        state.replace(session_for("u1", "T1", Some("R1"))).await;

        assert!(state.is_logged_in());
        assert_eq!(state.access_token().as_deref(), Some("T1"));
        assert_eq!(state.current().and_then(|s| s.user_id().map(str::to_owned)).as_deref(), Some("u1"));

        let persisted = store.load().await.expect("load").expect("persisted");
        assert_eq!(persisted.access_token, "T1");
        assert_eq!(persisted.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_clear_twice_is_safe() {
        let store = Arc::new(MemoryStore::new());
        let state = SessionState::new(store.clone());
        state.replace(session_for("u1", "T1", Some("R1"))).await;

        assert!(state.clear().await);
        assert!(!state.is_logged_in());
        assert!(store.raw().is_none());

        assert!(!state.clear().await);
        assert!(!state.is_logged_in());
        assert!(state.current().is_none());
    }

    #[tokio::test]
    async fn test_initialize_adopts_valid_session() {
        let store = Arc::new(MemoryStore::new());
        store.save(&session_for("u1", "T1", Some("R1"))).await.expect("seed");

        let state = SessionState::initialize(store.clone()).await;
        assert!(state.is_logged_in());
        assert_eq!(state.access_token().as_deref(), Some("T1"));
        assert!(store.raw().is_some());
    }

    #[tokio::test]
    async fn test_initialize_discards_logged_out_session() {
        let store = Arc::new(MemoryStore::new());
        store.save(&session_for("", "T1", Some("R1"))).await.expect("seed");

        let state = SessionState::initialize(store.clone()).await;
        assert!(!state.is_logged_in());
        assert!(store.raw().is_none());
    }

    #[tokio::test]
    async fn test_initialize_discards_malformed_data() {
        let store = Arc::new(MemoryStore::with_raw(b"{not json".to_vec()));

        let state = SessionState::initialize(store.clone()).await;
        assert!(state.current().is_none());
        assert!(store.raw().is_none());
    }

    #[tokio::test]
    async fn test_replace_if_current_refuses_after_logout() {
        let store = Arc::new(MemoryStore::new());
        let state = SessionState::new(store.clone());
        let original = state.replace(session_for("u1", "T1", Some("R1"))).await;
        state.clear().await;

        let installed = state
            .replace_if_current(&original, session_for("u1", "T2", Some("R2")))
            .await;

        assert!(installed.is_none());
        assert!(state.current().is_none());
        assert!(store.raw().is_none());
    }

    #[tokio::test]
    async fn test_replace_if_current_refuses_over_newer_login() {
        let state = SessionState::new(Arc::new(MemoryStore::new()));
        let original = state.replace(session_for("u1", "T1", Some("R1"))).await;
        state.replace(session_for("u2", "B1", Some("S1"))).await;

        let installed = state
            .replace_if_current(&original, session_for("u1", "T2", Some("R2")))
            .await;

        assert!(installed.is_none());
        assert_eq!(state.access_token().as_deref(), Some("B1"));

        let latest = state.current().expect("session");
        let swapped = state
            .replace_if_current(&latest, session_for("u2", "B2", Some("S2")))
            .await;
        assert_eq!(swapped.map(|s| s.access_token.clone()).as_deref(), Some("B2"));
    }

    /// Keychain whose secret cannot be decoded.
    #[derive(Default)]
    struct UnreadableStore {
        cleared: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl CredentialStore for UnreadableStore {
        async fn load(&self) -> Result<Option<Session>, StoreError> {
            Err(StoreError::Unreadable("keychain secret is not UTF-8 (3 bytes)".to_string()))
        }

        async fn save(&self, _session: &Session) -> Result<(), StoreError> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.cleared.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_discards_unreadable_secret() {
        let store = Arc::new(UnreadableStore::default());

        let state = SessionState::initialize(store.clone()).await;
        assert!(state.current().is_none());
        assert!(store.cleared.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_subscribers_see_login_and_logout() {
        let state = SessionState::new(Arc::new(MemoryStore::new()));
        let mut rx = state.subscribe();

        state.replace(session_for("u1", "T1", Some("R1"))).await;
        assert!(rx.has_changed().expect("sender alive"));
        assert!(rx.borrow_and_update().is_some());

        state.clear().await;
        assert!(rx.has_changed().expect("sender alive"));
        assert!(rx.borrow_and_update().is_none());
    }
}

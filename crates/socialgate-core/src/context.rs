//! App-start wiring.
//!
//! Everything that must be shared process-wide (session state, the token
//! refresher with its in-flight slot, the authenticated client) is built
//! once here. Screens take a fresh [`CallWrapper`] each.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::info;

use crate::api::{ApiClient, AuthMiddleware, HttpAuthApi, HttpTransport};
use crate::auth::{AuthService, CredentialStore, SessionState, TokenRefresher};
use crate::call::{CallWrapper, Navigator};
use crate::config::Config;

/// Client type every screen uses for authenticated calls.
pub type AuthedClient = ApiClient<AuthMiddleware<HttpTransport>>;

pub struct AuthContext {
    pub session: Arc<SessionState>,
    pub refresher: Arc<TokenRefresher>,
    pub auth: AuthService,
    pub client: AuthedClient,
}

impl AuthContext {
    /// Build from config, restoring any persisted session.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = config.credential_store()?;
        Self::new(&config.base_url, config.request_timeout(), store).await
    }

    pub async fn new(
        base_url: &str,
        timeout: std::time::Duration,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let transport =
            HttpTransport::new(base_url, timeout).context("Failed to build HTTP client")?;
        let session = Arc::new(SessionState::initialize(store).await);

        // Auth routes go out on the bare transport; everything else through the middleware.
        let auth_api = Arc::new(HttpAuthApi::new(transport.clone()));
        let refresher = Arc::new(TokenRefresher::new(auth_api.clone(), Arc::clone(&session)));
        let auth = AuthService::new(auth_api, Arc::clone(&session));
        let client = ApiClient::new(AuthMiddleware::new(transport, Arc::clone(&refresher)));

        info!(base_url, logged_in = session.is_logged_in(), "Auth context ready");
        Ok(Self {
            session,
            refresher,
            auth,
            client,
        })
    }

    pub fn call_wrapper(&self, navigator: Arc<dyn Navigator>) -> CallWrapper {
        CallWrapper::new(Arc::clone(&self.refresher), navigator)
    }
}

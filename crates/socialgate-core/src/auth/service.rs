use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use super::session::{Session, SessionState};
use crate::api::{ApiError, AuthApi};

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Email and password are required.")]
    MissingCredentials,

    #[error("Login failed: Invalid response from server.")]
    InvalidSession,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl LoginError {
    /// Short explanation for a login form.
    pub fn user_message(&self) -> String {
        match self {
            LoginError::Api(ApiError::Unauthorized) | LoginError::Api(ApiError::AccessDenied(_)) => {
                "Invalid email or password".to_string()
            }
            LoginError::Api(ApiError::Rejected { message, .. }) => message.clone(),
            LoginError::Api(ApiError::Network(e)) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            LoginError::Api(ApiError::Network(_)) | LoginError::Api(ApiError::Transport(_)) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// The login flow: the only place besides the token refresher that installs
/// a session.
pub struct AuthService {
    api: Arc<dyn AuthApi>,
    session: Arc<SessionState>,
}

impl AuthService {
    pub fn new(api: Arc<dyn AuthApi>, session: Arc<SessionState>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Arc<Session>, LoginError> {
        let email = email.trim();
        if email.is_empty() || password.trim().is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let session = self.api.login(email, password).await.map_err(|e| {
            error!(error = %e, "Login failed");
            LoginError::from(e)
        })?;

        if !session.is_logged_in() {
            error!("Login response did not produce a logged-in session");
            return Err(LoginError::InvalidSession);
        }

        let installed = self.session.replace(session).await;
        info!(user_id = ?installed.user_id(), "Login successful");
        Ok(installed)
    }

    pub async fn logout(&self) {
        self.session.clear().await;
        info!("Logged out");
    }
}

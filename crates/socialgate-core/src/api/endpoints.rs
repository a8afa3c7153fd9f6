//! Login and refresh-token exchanges.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::transport::{ApiRequest, ApiResponse, Transport};
use super::ApiError;
use crate::auth::{Session, User};

const LOGIN_PATH: &str = "/api/auth/login";
const REFRESH_PATH: &str = "/api/auth/refresh";

/// The two credential exchanges the session layer depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError>;
    async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError>;
}

/// Server envelope wrapped around every auth response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEnvelope<T> {
    #[serde(default)]
    is_success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: Option<User>,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl LoginResponse {
    fn into_session(self) -> Result<Session, ApiError> {
        let user = self
            .user
            .ok_or_else(|| ApiError::InvalidResponse("response has no user".to_string()))?;
        let access_token = self
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("response has no access token".to_string()))?;
        Ok(Session::new(user, access_token, self.refresh_token))
    }
}

/// [`AuthApi`] over the server's `/api/auth` routes.
///
/// Give it a transport *without* auth middleware: these calls carry their
/// own credentials, and a 401 from the refresh route must not recurse into
/// another refresh.
#[derive(Debug, Clone)]
pub struct HttpAuthApi<T> {
    transport: T,
}

impl<T: Transport> HttpAuthApi<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn exchange(&self, request: ApiRequest) -> Result<Session, ApiError> {
        let response = self.transport.send(&request).await?;
        Self::parse(response)
    }

    fn parse(response: ApiResponse) -> Result<Session, ApiError> {
        let status = response.status;
        let response = response.error_for_status()?;
        let envelope: ApiEnvelope<LoginResponse> = response.json()?;

        if !envelope.is_success {
            let message = envelope
                .error
                .unwrap_or_else(|| "request was not successful".to_string());
            warn!(status, error = %message, "Auth request rejected");
            return Err(ApiError::Rejected { status, message });
        }

        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("response has no data".to_string()))?
            .into_session()
    }
}

#[async_trait]
impl<T: Transport> AuthApi for HttpAuthApi<T> {
    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        debug!(email, "Sending login request");
        let request = ApiRequest::post(LOGIN_PATH, json!({ "email": email, "password": password }));
        self.exchange(request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError> {
        debug!("Sending refresh-token request");
        let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }));
        self.exchange(request).await
    }
}

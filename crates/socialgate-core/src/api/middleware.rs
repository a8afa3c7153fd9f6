use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::transport::{ApiRequest, ApiResponse, Transport};
use super::ApiError;
use crate::auth::{RefreshOutcome, SessionState, TokenRefresher};
use crate::call::budget;

/// Transport decorator that presents the current access token and heals a
/// 401 by refreshing once and replaying the request once.
pub struct AuthMiddleware<T> {
    inner: T,
    session: Arc<SessionState>,
    refresher: Arc<TokenRefresher>,
}

impl<T: Transport> AuthMiddleware<T> {
    pub fn new(inner: T, refresher: Arc<TokenRefresher>) -> Self {
        Self {
            inner,
            session: Arc::clone(refresher.session()),
            refresher,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthMiddleware<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut outgoing = request.clone();
        outgoing.bearer = self.session.access_token();
        if outgoing.bearer.is_none() {
            debug!(path = %request.path, "No access token, sending unauthenticated request");
        }

        let response = self.inner.send(&outgoing).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        if !budget::try_refresh() {
            warn!(path = %request.path, "Received 401 with refresh budget exhausted");
            return Ok(response);
        }

        warn!(path = %request.path, "Received 401 Unauthorized, attempting token refresh");
        let session = match self.refresher.refresh().await {
            RefreshOutcome::Success(session) => session,
            RefreshOutcome::Failure(reason) => {
                error!(%reason, "Could not refresh token");
                return Ok(response);
            }
        };

        let Some(token) = session.access_token() else {
            return Ok(response);
        };
        if !budget::try_resend() {
            warn!(path = %request.path, "Token refreshed but resend budget exhausted");
            return Ok(response);
        }

        debug!(path = %request.path, "Token refreshed, retrying request");
        outgoing.bearer = Some(token.to_owned());
        self.inner.send(&outgoing).await
    }
}

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::budget::{self, RetryBudget};
use super::outcome::CallOutcome;
use crate::api::ApiError;
use crate::auth::{RefreshFailure, RefreshOutcome, SessionState, TokenRefresher};

/// Host-side navigation, called when the session is lost for good.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn go_to_login(&self);
}

/// One per screen. Gives every remote operation the same busy gating,
/// error classification and session-loss handling.
pub struct CallWrapper {
    session: Arc<SessionState>,
    refresher: Arc<TokenRefresher>,
    navigator: Arc<dyn Navigator>,
    busy: AtomicBool,
}

/// Clears the busy flag when the call ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
        debug!("API call finished, busy=false");
    }
}

impl CallWrapper {
    pub fn new(refresher: Arc<TokenRefresher>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            session: Arc::clone(refresher.session()),
            refresher,
            navigator,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run `operation` unless a call is already in flight on this wrapper.
    ///
    /// `operation` may be invoked a second time after a successful token
    /// refresh, so it must be safe to repeat.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> CallOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let Some(_busy) = self.try_enter() else {
            warn!("API call skipped: a call is already in flight");
            return CallOutcome::Rejected;
        };

        let budget = Arc::new(RetryBudget::per_call());
        budget::scope(Arc::clone(&budget), self.run(&operation, &budget)).await
    }

    /// Like [`execute`](Self::execute), but gives up as soon as `cancel`
    /// fires. A cancelled call reports `ClientError` and touches nothing.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> CallOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("API call cancelled");
                CallOutcome::ClientError(ApiError::Cancelled.to_string())
            }
            outcome = self.execute(operation) => outcome,
        }
    }

    fn try_enter(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    async fn run<T, F, Fut>(&self, operation: &F, budget: &RetryBudget) -> CallOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        match operation().await {
            Ok(value) => {
                debug!("API call completed successfully");
                CallOutcome::Ok(value)
            }
            Err(ApiError::Unauthorized) => self.recover(operation, budget).await,
            Err(e) => Self::classify(e),
        }
    }

    /// Second chance after the middleware could not recover a 401.
    async fn recover<T, F, Fut>(&self, operation: &F, budget: &RetryBudget) -> CallOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !budget.take_refresh() {
            error!("Unauthorized with no refresh attempts left, logging out");
            return self.force_logout().await;
        }

        warn!("Unauthorized error (401), attempting to refresh token");
        match self.refresher.refresh().await {
            RefreshOutcome::Success(_) => {}
            // Logged out or in again elsewhere; whoever did that owns navigation
            RefreshOutcome::Failure(RefreshFailure::Superseded) if !self.session.is_logged_in() => {
                warn!("Session ended during token refresh");
                return CallOutcome::Unauthorized;
            }
            RefreshOutcome::Failure(RefreshFailure::Superseded) => {
                info!("Session replaced during token refresh, retrying with the new one");
            }
            RefreshOutcome::Failure(reason) => {
                error!(%reason, "Failed to refresh token, logging out");
                return self.force_logout().await;
            }
        }

        if !budget.take_resend() {
            error!("Token refreshed but no resend left, logging out");
            return self.force_logout().await;
        }

        info!("Token refreshed successfully, retrying API call");
        match operation().await {
            Ok(value) => CallOutcome::Ok(value),
            Err(ApiError::Unauthorized) => {
                error!("Retried call still unauthorized, logging out");
                self.force_logout().await
            }
            Err(e) => Self::classify(e),
        }
    }

    /// Teardown and navigation run on their own task so a cancelled or
    /// dropped call cannot stop between the two.
    async fn force_logout<T>(&self) -> CallOutcome<T> {
        let session = Arc::clone(&self.session);
        let navigator = Arc::clone(&self.navigator);
        let teardown = tokio::spawn(async move {
            session.clear().await;
            navigator.go_to_login().await;
        });

        if let Err(e) = teardown.await {
            error!(error = %e, "Logout task failed");
        }
        CallOutcome::Unauthorized
    }

    fn classify<T>(err: ApiError) -> CallOutcome<T> {
        if err.is_client_side() {
            error!(error = %err, "Unexpected error during API call");
        } else {
            error!(status = ?err.status(), error = %err, "API error");
        }
        CallOutcome::from_error(err)
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::session::{Session, SessionState};
use crate::api::{ApiError, AuthApi};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("network error during token refresh")]
    Network,

    #[error("server rejected the refresh token")]
    ServerRejected,

    #[error("malformed refresh response")]
    MalformedResponse,

    #[error("session changed while the refresh was in flight")]
    Superseded,
}

impl From<&ApiError> for RefreshFailure {
    fn from(err: &ApiError) -> Self {
        match err {
            ApiError::Network(_) | ApiError::Transport(_) | ApiError::Cancelled => {
                RefreshFailure::Network
            }
            ApiError::InvalidResponse(_) => RefreshFailure::MalformedResponse,
            ApiError::Unauthorized
            | ApiError::AccessDenied(_)
            | ApiError::NotFound(_)
            | ApiError::RateLimited
            | ApiError::Server { .. }
            | ApiError::Rejected { .. } => RefreshFailure::ServerRejected,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Success(Arc<Session>),
    Failure(RefreshFailure),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RefreshOutcome::Success(_))
    }
}

type SharedOutcome = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The exchange currently running, and the session it is refreshing.
struct InFlight {
    id: usize,
    origin: Arc<Session>,
    outcome: SharedOutcome,
}

/// Exchanges the refresh token for a new session, one exchange at a time.
///
/// Concurrent [`refresh`](Self::refresh) calls join the exchange already in
/// flight and all receive its outcome. Servers usually rotate refresh tokens,
/// so a second parallel exchange would be rejected and strand its caller.
///
/// An exchange only installs its result over the session it started from.
/// If the user logged out or logged in again meanwhile, the result is
/// dropped and callers get [`RefreshFailure::Superseded`].
pub struct TokenRefresher {
    api: Arc<dyn AuthApi>,
    session: Arc<SessionState>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    exchanges: Arc<AtomicUsize>,
}

impl TokenRefresher {
    pub fn new(api: Arc<dyn AuthApi>, session: Arc<SessionState>) -> Self {
        Self {
            api,
            session,
            in_flight: Arc::new(Mutex::new(None)),
            exchanges: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Number of refresh-token exchanges actually sent.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::Acquire)
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = {
            let mut slot = self.in_flight.lock().await;
            let current = self.session.current();

            let joinable = match (slot.as_ref(), current.as_ref()) {
                (Some(flight), Some(current)) if Arc::ptr_eq(&flight.origin, current) => {
                    Some(flight.outcome.clone())
                }
                _ => None,
            };

            if let Some(outcome) = joinable {
                debug!("Joining in-flight token refresh");
                outcome
            } else {
                let Some((origin, refresh_token)) = current.and_then(|s| {
                    let token = s.refresh_token().map(str::to_owned)?;
                    Some((s, token))
                }) else {
                    warn!("Refresh token does not exist");
                    return RefreshOutcome::Failure(RefreshFailure::NoRefreshToken);
                };

                if slot.is_some() {
                    debug!("Session changed since the in-flight refresh started");
                }
                let flight = self.start_exchange(origin, refresh_token);
                let outcome = flight.outcome.clone();
                *slot = Some(flight);
                outcome
            }
        };

        outcome.await
    }

    /// The exchange runs on its own task: a caller giving up must not abandon
    /// a rotation the server may already have committed.
    fn start_exchange(&self, origin: Arc<Session>, refresh_token: String) -> InFlight {
        let id = self.exchanges.fetch_add(1, Ordering::AcqRel) + 1;

        let api = Arc::clone(&self.api);
        let session = Arc::clone(&self.session);
        let slot = Arc::clone(&self.in_flight);
        let expected = Arc::clone(&origin);

        let task = tokio::spawn(async move {
            let outcome = exchange(api.as_ref(), &session, &expected, refresh_token).await;
            let mut slot = slot.lock().await;
            // A newer exchange may own the slot by now
            if slot.as_ref().is_some_and(|f| f.id == id) {
                slot.take();
            }
            outcome
        });

        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                error!(error = %e, "Token refresh task failed");
                RefreshOutcome::Failure(RefreshFailure::Network)
            })
        }
        .boxed()
        .shared();

        InFlight { id, origin, outcome }
    }
}

async fn exchange(
    api: &dyn AuthApi,
    session: &SessionState,
    origin: &Arc<Session>,
    refresh_token: String,
) -> RefreshOutcome {
    let mut fresh = match api.refresh(&refresh_token).await {
        Ok(fresh) => fresh,
        Err(e) => {
            error!(error = %e, "Failed to refresh token");
            return RefreshOutcome::Failure(RefreshFailure::from(&e));
        }
    };

    if !fresh.is_logged_in() {
        error!("Refresh response is missing the user or access token");
        return RefreshOutcome::Failure(RefreshFailure::MalformedResponse);
    }

    // No rotation: keep using the refresh token we already have
    if fresh.refresh_token().is_none() {
        fresh.refresh_token = Some(refresh_token);
    }

    match session.replace_if_current(origin, fresh).await {
        Some(installed) => {
            info!(user_id = ?installed.user_id(), "Token refreshed successfully");
            RefreshOutcome::Success(installed)
        }
        None => {
            warn!("Session changed during token refresh, discarding the new tokens");
            RefreshOutcome::Failure(RefreshFailure::Superseded)
        }
    }
}

//! Shared test doubles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::{ApiError, ApiRequest, ApiResponse, AuthApi, Transport};
use crate::auth::{MemoryStore, Session, SessionState, User};
use crate::call::Navigator;

pub(crate) fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: "Ann".to_string(),
        email: "a@x.com".to_string(),
        photo_url: None,
    }
}

pub(crate) fn session_for(user_id: &str, access: &str, refresh: Option<&str>) -> Session {
    Session::new(user(user_id), access, refresh.map(str::to_owned))
}

pub(crate) async fn logged_in_state(access: &str, refresh: Option<&str>) -> Arc<SessionState> {
    let state = Arc::new(SessionState::new(Arc::new(MemoryStore::new())));
    state.replace(session_for("u1", access, refresh)).await;
    state
}

/// Answers from a script, then 401 forever. Records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: impl IntoIterator<Item = ApiResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn bearers(&self) -> Vec<Option<String>> {
        self.requests().into_iter().map(|r| r.bearer).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let next = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        Ok(next.unwrap_or_else(|| ApiResponse::new(401, "")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshMode {
    /// Every exchange returns T{n+1}/R{n+1}
    Rotate,
    /// New access token, no refresh token in the response
    KeepRefreshToken,
    Reject,
    Offline,
    Malformed,
}

/// Login accepts `a@x.com`/`pw` and yields u1/T1/R1; refresh follows `mode`.
pub(crate) struct StubAuthApi {
    mode: RefreshMode,
    gate: Option<Semaphore>,
    refreshes: AtomicUsize,
    last_refresh_token: Mutex<Option<String>>,
}

impl StubAuthApi {
    pub(crate) fn new(mode: RefreshMode) -> Self {
        Self {
            mode,
            gate: None,
            refreshes: AtomicUsize::new(0),
            last_refresh_token: Mutex::new(None),
        }
    }

    /// Refresh exchanges block until [`release`](Self::release).
    pub(crate) fn gated(mode: RefreshMode) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(mode)
        }
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuthApi for StubAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        if email == "a@x.com" && password == "pw" {
            Ok(session_for("u1", "T1", Some("R1")))
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .last_refresh_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(refresh_token.to_string());

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }

        let access = format!("T{}", n + 1);
        match self.mode {
            RefreshMode::Rotate => Ok(session_for("u1", &access, Some(&format!("R{}", n + 1)))),
            RefreshMode::KeepRefreshToken => Ok(session_for("u1", &access, None)),
            RefreshMode::Reject => Err(ApiError::Rejected {
                status: 200,
                message: "Invalid refresh token".to_string(),
            }),
            RefreshMode::Offline => Err(ApiError::Transport("connection refused".to_string())),
            RefreshMode::Malformed => Ok(Session {
                user: None,
                ..session_for("u1", &access, None)
            }),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    calls: AtomicUsize,
}

impl RecordingNavigator {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn go_to_login(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

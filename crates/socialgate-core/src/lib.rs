//! Client-side session and authentication layer for the social app.
//!
//! - [`auth`]: session state, credential persistence, token refresh, login
//! - [`api`]: transport, auth middleware and typed JSON client
//! - [`call`]: per-screen call wrapper and its outcomes
//! - [`config`]: configuration file and environment overrides
//! - [`context`]: one-time wiring of the above at app start

pub mod api;
pub mod auth;
pub mod call;
pub mod config;
pub mod context;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse, AuthMiddleware, HttpTransport, Transport};
pub use auth::{
    AuthService, CredentialStore, LoginError, RefreshFailure, RefreshOutcome, Session,
    SessionState, TokenRefresher, User,
};
pub use call::{CallOutcome, CallWrapper, Navigator};
pub use config::{Config, CredentialBackend};
pub use context::{AuthContext, AuthedClient};

//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionState`: the shared, whole-record session with login invariant
//! - `CredentialStore`: durable session storage (keychain, file, memory)
//! - `TokenRefresher`: single-flight refresh-token exchange
//! - `AuthService`: the login/logout flow

pub mod credentials;
pub mod refresh;
pub mod service;
pub mod session;

pub use credentials::{CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError};
pub use refresh::{RefreshFailure, RefreshOutcome, TokenRefresher};
pub use service::{AuthService, LoginError};
pub use session::{Session, SessionState, User};

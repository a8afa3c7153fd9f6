//! REST API plumbing for the social app backend.
//!
//! This module provides:
//! - `Transport`: the request seam, with `HttpTransport` over reqwest
//! - `AuthMiddleware`: bearer token attachment and 401 self-healing
//! - `ApiClient`: typed JSON helpers returning classified `ApiError`s
//! - `AuthApi`: the login and refresh-token exchanges

pub mod client;
pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod transport;

pub use client::ApiClient;
pub use endpoints::{AuthApi, HttpAuthApi};
pub use error::ApiError;
pub use middleware::AuthMiddleware;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};

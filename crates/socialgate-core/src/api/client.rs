//! Typed JSON helpers over any [`Transport`].
//!
//! Wrap an [`AuthMiddleware`](super::AuthMiddleware) for authenticated
//! calls; each helper turns non-2xx answers into a classified [`ApiError`].

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::transport::{ApiRequest, ApiResponse, Method, Transport};
use super::ApiError;

#[derive(Debug, Clone)]
pub struct ApiClient<T> {
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a request and fail on non-2xx.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.transport.send(&request).await?.error_for_status()
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let body = Self::to_value(body)?;
        self.send(ApiRequest::post(path, body)).await?.json()
    }

    pub async fn put_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let body = Self::to_value(body)?;
        self.send(ApiRequest::new(Method::Put, path).with_body(body))
            .await?
            .json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::new(Method::Delete, path)).await?;
        Ok(())
    }

    fn to_value<B: Serialize>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to serialize request body: {}", e)))
    }
}
